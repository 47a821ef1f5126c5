// MIT License - Copyright (c) 2026 Peter Wright
// Error reporting

use tracing::error;

use crate::error::BridgeError;

/// Sink for errors that need someone's attention.
pub trait ErrorReporter: Send + Sync {
    /// `context` names the activity that failed ("poll", "command", "login").
    fn report(&self, context: &str, error: &BridgeError);
}

/// Reports through the log at `error` level.
///
/// The optional endpoint is attached to every record so a log shipper can
/// route reports to the configured collector.
#[derive(Debug, Clone, Default)]
pub struct LogReporter {
    endpoint: Option<String>,
}

impl LogReporter {
    pub fn new(endpoint: Option<String>) -> Self {
        Self { endpoint }
    }
}

impl ErrorReporter for LogReporter {
    fn report(&self, context: &str, error: &BridgeError) {
        match &self.endpoint {
            Some(endpoint) => error!(context, endpoint = %endpoint, "{error}"),
            None => error!(context, "{error}"),
        }
    }
}
