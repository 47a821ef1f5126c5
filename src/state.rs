// MIT License - Copyright (c) 2026 Peter Wright
// Alarm state vocabularies and the translation between them

use std::fmt;

use crate::error::{BridgeError, Result};

/// Alarm state as reported by the remote API.
///
/// Both API generations are covered: the legacy API reports `Off`/`Home`/`Away`,
/// the current one upper-case literals with transitional variants such as
/// `AWAY_COUNT`. Parsing is case-insensitive and treats spaces, dashes and
/// underscores alike. Anything else is kept verbatim in [`RemoteAlarmState::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAlarmState {
    Off,
    Home,
    Away,
    /// Arming to home, exit delay running
    HomeCount,
    /// Arming to away, exit delay running
    AwayCount,
    ExitDelay,
    EntryDelay,
    Alarm,
    AlarmCount,
    Other(String),
}

impl RemoteAlarmState {
    pub fn from_remote(literal: &str) -> Self {
        let normalized: String = literal
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        match normalized.as_str() {
            "OFF" => Self::Off,
            "HOME" => Self::Home,
            "AWAY" => Self::Away,
            "HOME_COUNT" => Self::HomeCount,
            "AWAY_COUNT" => Self::AwayCount,
            "EXIT_DELAY" => Self::ExitDelay,
            "ENTRY_DELAY" => Self::EntryDelay,
            "ALARM" => Self::Alarm,
            "ALARM_COUNT" => Self::AlarmCount,
            _ => Self::Other(literal.to_string()),
        }
    }

    /// The literal as the current API spells it.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Off => "OFF",
            Self::Home => "HOME",
            Self::Away => "AWAY",
            Self::HomeCount => "HOME_COUNT",
            Self::AwayCount => "AWAY_COUNT",
            Self::ExitDelay => "EXIT_DELAY",
            Self::EntryDelay => "ENTRY_DELAY",
            Self::Alarm => "ALARM",
            Self::AlarmCount => "ALARM_COUNT",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for RemoteAlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alarm state in bus vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusAlarmState {
    Off,
    Home,
    Away,
    /// Remote state could not be mapped. Published as an empty payload.
    Unknown,
}

impl BusAlarmState {
    /// Payload published on the state topic.
    pub fn as_payload(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Home => "home",
            Self::Away => "away",
            Self::Unknown => "",
        }
    }
}

impl fmt::Display for BusAlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            other => f.write_str(other.as_payload()),
        }
    }
}

/// A state-change instruction understood by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCommand {
    Off,
    Home,
    Away,
}

impl RemoteCommand {
    /// Path segment / form value for the set-state request. Identical for
    /// both API generations.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Home => "home",
            Self::Away => "away",
        }
    }

    /// The remote state the panel settles in once the command is applied.
    pub fn target_state(&self) -> RemoteAlarmState {
        match self {
            Self::Off => RemoteAlarmState::Off,
            Self::Home => RemoteAlarmState::Home,
            Self::Away => RemoteAlarmState::Away,
        }
    }
}

/// Map a remote state onto the bus vocabulary. Never fails.
///
/// Transitional arming states count as the state being armed into, so a
/// command issued during the exit delay is not repeated.
pub fn to_bus_vocabulary(remote: &RemoteAlarmState) -> BusAlarmState {
    match remote {
        RemoteAlarmState::Off => BusAlarmState::Off,
        RemoteAlarmState::Home | RemoteAlarmState::HomeCount => BusAlarmState::Home,
        RemoteAlarmState::Away | RemoteAlarmState::AwayCount | RemoteAlarmState::ExitDelay => {
            BusAlarmState::Away
        }
        RemoteAlarmState::EntryDelay
        | RemoteAlarmState::Alarm
        | RemoteAlarmState::AlarmCount
        | RemoteAlarmState::Other(_) => BusAlarmState::Unknown,
    }
}

/// Parse an inbound bus command literal.
pub fn to_remote_command(literal: &str) -> Result<RemoteCommand> {
    match literal.trim().to_lowercase().as_str() {
        "off" | "disarm" | "disarmed" => Ok(RemoteCommand::Off),
        "home" | "arm_home" => Ok(RemoteCommand::Home),
        "away" | "arm_away" => Ok(RemoteCommand::Away),
        _ => Err(BridgeError::UnrecognizedCommand {
            command: literal.to_string(),
        }),
    }
}
