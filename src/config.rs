// MIT License - Copyright (c) 2026 Peter Wright
// Session and sync configuration

use std::time::Duration;

/// Which generation of the remote API to talk to.
///
/// The two generations are incompatible on the wire but expose the same
/// operations; see [`crate::api`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiGeneration {
    /// Form-encoded requests, session cookie, `simplisafe.com/mobile`
    Legacy,
    /// JSON requests, OAuth bearer token with refresh, `api.simplisafe.com/v1`
    Current,
}

impl ApiGeneration {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Legacy => "https://simplisafe.com/mobile",
            Self::Current => "https://api.simplisafe.com/v1",
        }
    }

    /// Parse a configuration value ("legacy", "current").
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "legacy" | "v0" => Some(Self::Legacy),
            "current" | "v1" => Some(Self::Current),
            _ => None,
        }
    }
}

/// Configuration for the remote session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub generation: ApiGeneration,
    /// Overrides the generation's default base URL (tests, proxies)
    pub base_url: Option<String>,
    /// Upper bound for every outbound request, in milliseconds
    pub request_timeout_ms: u64,
    /// Credentials expiring within this window are refreshed before use
    pub refresh_margin_secs: u64,
    /// Device name announced at login
    pub device_name: String,
    /// Pin site selection to this id instead of taking the first one
    pub site_id: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            generation: ApiGeneration::Current,
            base_url: None,
            request_timeout_ms: 30000,
            refresh_margin_secs: 60,
            device_name: "simplisafe2mqtt".to_string(),
            site_id: None,
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    pub fn resolved_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.generation.default_base_url())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_margin(&self) -> chrono::Duration {
        // Capped at one day; anything larger would refresh on every call anyway.
        chrono::Duration::seconds(self.refresh_margin_secs.min(86_400) as i64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn generation(mut self, generation: ApiGeneration) -> Self {
        self.config.generation = generation;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn refresh_margin_secs(mut self, secs: u64) -> Self {
        self.config.refresh_margin_secs = secs;
        self
    }

    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.config.device_name = name.into();
        self
    }

    pub fn site_id(mut self, id: Option<String>) -> Self {
        self.config.site_id = id;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

/// What the sync loop does when a poll fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollFailurePolicy {
    /// Report and stop; a process supervisor is expected to restart us.
    Exit,
    /// Retry retryable failures with exponential backoff, `base_delay_ms`
    /// doubling per attempt (capped at 16x), up to `max_attempts` in a row.
    Retry { max_attempts: u32, base_delay_ms: u64 },
}

impl PollFailurePolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(base_delay_ms: u64, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(4);
        Duration::from_millis(base_delay_ms.saturating_mul(factor))
    }
}

/// Configuration for the polling loop.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub poll_interval_secs: u64,
    pub failure_policy: PollFailurePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
            failure_policy: PollFailurePolicy::Exit,
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval_secs = secs.max(1);
        self
    }

    pub fn failure_policy(mut self, policy: PollFailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}
