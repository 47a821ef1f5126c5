// MIT License - Copyright (c) 2026 Peter Wright
// Error taxonomy for the session and sync core

/// All errors that can occur in the simplisafe bridge library.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Network-level failure: DNS, TLS, connection reset, request timeout.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Bad credentials, expired or rejected token. The session must log in again.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// The remote answered with something we could not understand.
    #[error("Invalid response: {details}")]
    Parse { details: String },

    #[error("No controllable site in account")]
    NoSite,

    #[error("Unrecognized command: {command:?}")]
    UnrecognizedCommand { command: String },

    #[error("Not ready: {reason}")]
    NotReady { reason: String },

    /// The remote rejected a request with a non-auth HTTP status.
    #[error("Remote API returned HTTP {status} for {operation}")]
    Status { operation: String, status: u16 },

    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl BridgeError {
    pub(crate) fn auth(message: impl Into<String>) -> Self {
        BridgeError::Auth {
            message: message.into(),
        }
    }

    pub(crate) fn parse(details: impl Into<String>) -> Self {
        BridgeError::Parse {
            details: details.into(),
        }
    }

    pub(crate) fn not_ready(reason: impl Into<String>) -> Self {
        BridgeError::NotReady {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation later can reasonably succeed.
    ///
    /// `Auth` is included: it is recoverable, but only after a fresh login.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Transport(_)
                | BridgeError::Auth { .. }
                | BridgeError::Status { .. }
                | BridgeError::Mqtt(_)
        )
    }

    /// Whether the session has to log in again before the next call.
    pub fn requires_login(&self) -> bool {
        matches!(self, BridgeError::Auth { .. })
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
