// MIT License - Copyright (c) 2026 Peter Wright
// SimpliSafe cloud alarm to MQTT bridge
//
//! # simplisafe-bridge
//!
//! Keeps a SimpliSafe alarm system and an MQTT topic pair in sync.
//!
//! The remote state is polled on a fixed period and published, retained, in
//! a small vocabulary (`off`, `home`, `away`, or empty for anything else).
//! Commands arriving on the command topic are translated back and applied to
//! the remote only when the observed state differs from the target.
//!
//! Both generations of the remote API are supported: the legacy
//! form-encoded API with a session cookie, and the current JSON API with
//! OAuth bearer tokens that are refreshed before they expire.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use secrecy::SecretString;
//! use simplisafe_bridge::{Account, LogReporter, SessionConfig, SyncConfig, build_api, sync};
//! # use simplisafe_bridge::{BusAlarmState, StatePublisher};
//! # struct Stdout;
//! # #[async_trait::async_trait]
//! # impl StatePublisher for Stdout {
//! #     async fn publish_state(&self, s: BusAlarmState) -> simplisafe_bridge::Result<()> {
//! #         println!("{s}");
//! #         Ok(())
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let api = build_api(&SessionConfig::builder().build())?;
//!     let account = Account {
//!         username: "me@example.com".into(),
//!         password: SecretString::from("secret".to_string()),
//!     };
//!     api.login(&account.username, &account.password).await?;
//!
//!     let (sync_loop, listener) = sync::bridge(
//!         api,
//!         Arc::new(Stdout),
//!         Arc::new(LogReporter::default()),
//!         account,
//!         SyncConfig::builder().build(),
//!     );
//!     listener.handle_message(b"arm_home").await;
//!
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!     sync_loop.run(shutdown).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod applier;
pub mod bus;
pub mod config;
pub mod error;
pub mod report;
pub mod session;
pub mod state;
pub mod sync;

// Re-exports for convenience
pub use api::{Account, CurrentApi, LegacyApi, RemoteAlarmApi, Site, build_api};
pub use applier::{ApplyOutcome, CommandApplier};
pub use bus::{MqttStatePublisher, StatePublisher, parse_mqtt_url};
pub use config::{
    ApiGeneration, PollFailurePolicy, SessionConfig, SessionConfigBuilder, SyncConfig,
    SyncConfigBuilder,
};
pub use error::{BridgeError, Result};
pub use report::{ErrorReporter, LogReporter};
pub use session::{RemoteSession, SessionState};
pub use state::{BusAlarmState, RemoteAlarmState, RemoteCommand, to_bus_vocabulary, to_remote_command};
pub use sync::{CommandListener, SyncLoop};
