// MIT License - Copyright (c) 2026 Peter Wright
// Sync loop and command listener

use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, warn};

use crate::api::{Account, RemoteAlarmApi};
use crate::applier::{ApplyOutcome, CommandApplier, SiteCache};
use crate::bus::StatePublisher;
use crate::config::{PollFailurePolicy, SyncConfig};
use crate::error::Result;
use crate::report::ErrorReporter;
use crate::state::{BusAlarmState, to_bus_vocabulary};

/// Wire a sync loop and a command listener around one API and one site cache.
pub fn bridge(
    api: Arc<dyn RemoteAlarmApi>,
    publisher: Arc<dyn StatePublisher>,
    reporter: Arc<dyn ErrorReporter>,
    account: Account,
    config: SyncConfig,
) -> (SyncLoop, CommandListener) {
    let site: SiteCache = Arc::new(RwLock::new(None));
    let listener = CommandListener {
        applier: CommandApplier::new(api.clone(), site.clone()),
        reporter: reporter.clone(),
    };
    let sync_loop = SyncLoop {
        api,
        site,
        publisher,
        reporter,
        account,
        config,
    };
    (sync_loop, listener)
}

/// Polls the remote on a fixed period and publishes the translated state.
pub struct SyncLoop {
    api: Arc<dyn RemoteAlarmApi>,
    site: SiteCache,
    publisher: Arc<dyn StatePublisher>,
    reporter: Arc<dyn ErrorReporter>,
    account: Account,
    config: SyncConfig,
}

impl SyncLoop {
    /// Fetch once, update the cache and publish. Publish failures are logged,
    /// not returned: the state is re-published on the next tick anyway.
    pub async fn poll_once(&self) -> Result<BusAlarmState> {
        let site = self.api.fetch_status().await?;
        let state = to_bus_vocabulary(&site.state);
        debug!("Site {} reports {} ({state})", site.id, site.state);
        *self.site.write().await = Some(site);

        if let Err(e) = self.publisher.publish_state(state).await {
            error!("Failed to publish state: {e}");
        }
        Ok(state)
    }

    /// Run until `shutdown` flips to true, or until a poll failure is fatal
    /// under the configured policy; that failure is returned.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!("Sync loop stopping");
                    return Ok(());
                }
            }

            let error = match self.poll_once().await {
                Ok(_) => {
                    if failures > 0 {
                        info!("Poll recovered after {failures} failure(s)");
                    }
                    failures = 0;
                    continue;
                }
                Err(e) => e,
            };
            self.reporter.report("poll", &error);

            let (max_attempts, base_delay_ms) = match self.config.failure_policy {
                PollFailurePolicy::Exit => return Err(error),
                PollFailurePolicy::Retry {
                    max_attempts,
                    base_delay_ms,
                } => (max_attempts, base_delay_ms),
            };
            if !error.is_retryable() || failures >= max_attempts {
                error!("Giving up polling after {} attempt(s)", failures + 1);
                return Err(error);
            }
            failures += 1;

            let delay = PollFailurePolicy::backoff(base_delay_ms, failures);
            warn!(
                "Poll failed (attempt {failures}/{max_attempts}), retrying in {:.1}s",
                delay.as_secs_f64()
            );
            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.changed() => {
                    info!("Sync loop stopping");
                    return Ok(());
                }
            }

            if error.requires_login() {
                self.relogin().await;
            }
            ticker.reset_immediately();
        }
    }

    async fn relogin(&self) {
        info!("Logging in again as {}", self.account.username);
        if let Err(e) = self
            .api
            .login(&self.account.username, &self.account.password)
            .await
        {
            // The next poll fails fast on the failed session and counts as an attempt.
            self.reporter.report("login", &e);
        }
    }
}

/// Handles inbound command messages. Never fails: every error is reported
/// and the message dropped.
pub struct CommandListener {
    applier: CommandApplier,
    reporter: Arc<dyn ErrorReporter>,
}

impl CommandListener {
    pub async fn handle_message(&self, payload: &[u8]) -> Option<ApplyOutcome> {
        let literal = String::from_utf8_lossy(payload);
        info!("Command received: {literal:?}");
        match self.applier.apply(&literal).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                self.reporter.report("command", &e);
                None
            }
        }
    }
}

impl std::fmt::Debug for CommandListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandListener").finish_non_exhaustive()
    }
}
