// MIT License - Copyright (c) 2026 Peter Wright
// Command applier: bus command -> remote state change, only when needed

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::api::{RemoteAlarmApi, Site};
use crate::error::{BridgeError, Result};
use crate::state::{BusAlarmState, to_bus_vocabulary, to_remote_command};

/// Last observed site, shared between the poller and the command path.
///
/// Always replaced or patched under the write lock, never read half-written.
pub type SiteCache = Arc<RwLock<Option<Site>>>;

/// What applying a command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Site already in the requested state; nothing was sent.
    Unchanged(BusAlarmState),
    /// One state-change request was accepted by the remote.
    Changed {
        from: BusAlarmState,
        to: BusAlarmState,
    },
}

pub struct CommandApplier {
    api: Arc<dyn RemoteAlarmApi>,
    site: SiteCache,
    apply_lock: Mutex<()>,
}

impl CommandApplier {
    pub fn new(api: Arc<dyn RemoteAlarmApi>, site: SiteCache) -> Self {
        Self {
            api,
            site,
            apply_lock: Mutex::new(()),
        }
    }

    /// Apply a bus command literal against the last observed state.
    ///
    /// Fails with `UnrecognizedCommand` for unknown literals and `NotReady`
    /// before the first successful poll; neither touches the network. After a
    /// successful write the cached state is advanced to the target, so
    /// repeating the command is a no-op.
    pub async fn apply(&self, literal: &str) -> Result<ApplyOutcome> {
        let command = to_remote_command(literal)?;
        // Serialize commands so two identical ones cannot both observe the old state.
        let _guard = self.apply_lock.lock().await;

        let current = self
            .site
            .read()
            .await
            .clone()
            .ok_or_else(|| BridgeError::not_ready("no alarm state observed yet"))?;

        let observed = to_bus_vocabulary(&current.state);
        let target = to_bus_vocabulary(&command.target_state());
        if observed == target {
            debug!("Site {} already {target}, no state change required", current.id);
            return Ok(ApplyOutcome::Unchanged(observed));
        }

        info!("Setting site {} from {observed} to {target}", current.id);
        self.api.set_state(&current, command).await?;

        let mut cached = self.site.write().await;
        if let Some(site) = cached.as_mut()
            && site.id == current.id
        {
            site.state = command.target_state();
        }
        Ok(ApplyOutcome::Changed {
            from: observed,
            to: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use crate::state::{RemoteAlarmState, RemoteCommand};

    /// In-memory API recording writes.
    #[derive(Default)]
    struct FakeApi {
        writes: std::sync::Mutex<Vec<(String, RemoteCommand)>>,
        fail_writes: bool,
    }

    #[async_trait]
    impl RemoteAlarmApi for FakeApi {
        async fn login(&self, _username: &str, _password: &SecretString) -> Result<()> {
            Ok(())
        }

        async fn fetch_status(&self) -> Result<Site> {
            Ok(site(RemoteAlarmState::Off))
        }

        async fn set_state(&self, site: &Site, command: RemoteCommand) -> Result<()> {
            if self.fail_writes {
                return Err(BridgeError::Status {
                    operation: "set state".into(),
                    status: 503,
                });
            }
            self.writes.lock().unwrap().push((site.id.clone(), command));
            Ok(())
        }
    }

    fn site(state: RemoteAlarmState) -> Site {
        Site {
            id: "4321".to_string(),
            state,
        }
    }

    fn applier(api: Arc<FakeApi>, state: Option<RemoteAlarmState>) -> CommandApplier {
        let cache: SiteCache = Arc::new(RwLock::new(state.map(site)));
        CommandApplier::new(api, cache)
    }

    #[tokio::test]
    async fn test_repeated_command_writes_once() {
        let api = Arc::new(FakeApi::default());
        let applier = applier(api.clone(), Some(RemoteAlarmState::Off));

        let first = applier.apply("home").await.unwrap();
        assert_eq!(
            first,
            ApplyOutcome::Changed {
                from: BusAlarmState::Off,
                to: BusAlarmState::Home
            }
        );
        let second = applier.apply("HOME").await.unwrap();
        assert_eq!(second, ApplyOutcome::Unchanged(BusAlarmState::Home));

        let writes = api.writes.lock().unwrap();
        assert_eq!(*writes, vec![("4321".to_string(), RemoteCommand::Home)]);
    }

    #[tokio::test]
    async fn test_matching_state_sends_nothing() {
        let api = Arc::new(FakeApi::default());
        let applier = applier(api.clone(), Some(RemoteAlarmState::AwayCount));

        let outcome = applier.apply("arm_away").await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged(BusAlarmState::Away));
        assert!(api.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_ready_before_first_poll() {
        let api = Arc::new(FakeApi::default());
        let applier = applier(api.clone(), None);

        let result = applier.apply("away").await;
        assert!(matches!(result, Err(BridgeError::NotReady { .. })), "{result:?}");
        assert!(api.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_command_sends_nothing() {
        let api = Arc::new(FakeApi::default());
        let applier = applier(api.clone(), Some(RemoteAlarmState::Off));

        let result = applier.apply("frobnicate").await;
        assert!(matches!(
            result,
            Err(BridgeError::UnrecognizedCommand { ref command }) if command == "frobnicate"
        ));
        assert!(api.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cached_state() {
        let api = Arc::new(FakeApi {
            fail_writes: true,
            ..FakeApi::default()
        });
        let cache: SiteCache = Arc::new(RwLock::new(Some(site(RemoteAlarmState::Off))));
        let applier = CommandApplier::new(api, cache.clone());

        assert!(applier.apply("away").await.is_err());
        assert_eq!(cache.read().await.as_ref().unwrap().state, RemoteAlarmState::Off);
    }

    #[tokio::test]
    async fn test_unknown_remote_state_is_overridden() {
        let api = Arc::new(FakeApi::default());
        let applier = applier(api.clone(), Some(RemoteAlarmState::Other("???".into())));

        let outcome = applier.apply("off").await.unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::Changed {
                from: BusAlarmState::Unknown,
                to: BusAlarmState::Off
            }
        );
        assert_eq!(api.writes.lock().unwrap().len(), 1);
    }
}
