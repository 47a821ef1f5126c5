// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use secrecy::SecretString;
use serde::Deserialize;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use simplisafe_bridge::{
    Account, ApiGeneration, ErrorReporter, LogReporter, MqttStatePublisher, PollFailurePolicy,
    SessionConfig, SyncConfig, build_api, parse_mqtt_url, sync,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "simplisafe2mqtt")]
#[command(about = "Bridge between a SimpliSafe alarm system and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct Config {
    account: AccountToml,
    mqtt: MqttToml,
    #[serde(default)]
    bridge: BridgeToml,
    #[serde(default)]
    reporting: ReportingToml,
}

#[derive(Deserialize)]
struct AccountToml {
    username: String,
    password: String,
    /// "current" (default) or "legacy"
    #[serde(default = "default_api")]
    api: String,
    #[serde(default)]
    base_url: Option<String>,
    /// Control this site instead of the first one the account lists
    #[serde(default)]
    site_id: Option<String>,
    #[serde(default = "default_device_name")]
    device_name: String,
}

fn default_api() -> String {
    "current".to_string()
}
fn default_device_name() -> String {
    "simplisafe2mqtt".to_string()
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    command_topic: String,
    state_topic: String,
}

fn default_client_id() -> String {
    "simplimqtt".to_string()
}

#[derive(Debug, Deserialize)]
struct BridgeToml {
    #[serde(default = "default_poll_interval")]
    poll_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    request_timeout_ms: u64,
    #[serde(default = "default_refresh_margin")]
    refresh_margin_secs: u64,
    /// "exit" (default) or "retry"
    #[serde(default = "default_on_poll_error")]
    on_poll_error: String,
    #[serde(default = "default_max_poll_retries")]
    max_poll_retries: u32,
    #[serde(default = "default_retry_delay")]
    retry_delay_ms: u64,
}

impl Default for BridgeToml {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            request_timeout_ms: default_request_timeout(),
            refresh_margin_secs: default_refresh_margin(),
            on_poll_error: default_on_poll_error(),
            max_poll_retries: default_max_poll_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

fn default_poll_interval() -> u64 {
    15
}
fn default_request_timeout() -> u64 {
    30000
}
fn default_refresh_margin() -> u64 {
    60
}
fn default_on_poll_error() -> String {
    "exit".to_string()
}
fn default_max_poll_retries() -> u32 {
    5
}
fn default_retry_delay() -> u64 {
    2000
}

#[derive(Debug, Default, Deserialize)]
struct ReportingToml {
    /// Attached to every error report
    #[serde(default)]
    endpoint: Option<String>,
}

/// Everything the bridge needs, validated.
struct Settings {
    account: Account,
    session: SessionConfig,
    sync: SyncConfig,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt: MqttToml,
    report_endpoint: Option<String>,
}

impl Settings {
    fn from_config(config: Config) -> Result<Self> {
        let generation = ApiGeneration::from_name(&config.account.api)
            .with_context(|| format!("Unknown api generation: {}", config.account.api))?;
        let mut session = SessionConfig::builder()
            .generation(generation)
            .request_timeout_ms(config.bridge.request_timeout_ms)
            .refresh_margin_secs(config.bridge.refresh_margin_secs)
            .device_name(config.account.device_name)
            .site_id(config.account.site_id);
        if let Some(url) = config.account.base_url {
            session = session.base_url(url);
        }
        let session = session.build();
        url::Url::parse(session.resolved_base_url()).context("Invalid account.base_url")?;

        let sync = SyncConfig::builder()
            .poll_interval_secs(config.bridge.poll_interval_secs)
            .failure_policy(parse_failure_policy(&config.bridge)?)
            .build();

        let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;

        Ok(Self {
            account: Account {
                username: config.account.username,
                password: SecretString::from(config.account.password),
            },
            session,
            sync,
            mqtt_host,
            mqtt_port,
            mqtt: config.mqtt,
            report_endpoint: config.reporting.endpoint,
        })
    }
}

fn parse_failure_policy(bridge: &BridgeToml) -> Result<PollFailurePolicy> {
    match bridge.on_poll_error.to_lowercase().as_str() {
        "exit" => Ok(PollFailurePolicy::Exit),
        "retry" => Ok(PollFailurePolicy::Retry {
            max_attempts: bridge.max_poll_retries,
            base_delay_ms: bridge.retry_delay_ms,
        }),
        other => anyhow::bail!("Unknown on_poll_error policy: {other}"),
    }
}

fn load_settings(path: &str) -> Result<Settings> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    let config: Config = toml::from_str(&text).context("Failed to parse config file")?;
    Settings::from_config(config)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

enum Stop {
    Shutdown,
    Reload,
    SyncEnded(std::result::Result<simplisafe_bridge::Result<()>, JoinError>),
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=simplisafe_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        let reporter: Arc<dyn ErrorReporter> =
            Arc::new(LogReporter::new(settings.report_endpoint.clone()));

        // Log in before touching the bus; without a session there is nothing to bridge.
        let api = build_api(&settings.session)?;
        info!(
            "Logging in to {} as {}",
            settings.session.resolved_base_url(),
            settings.account.username
        );
        if let Err(e) = api
            .login(&settings.account.username, &settings.account.password)
            .await
        {
            reporter.report("login", &e);
            return Err(e).context("Login failed");
        }
        info!("Logged in");

        // Set up MQTT
        let mut mqtt_opts =
            MqttOptions::new(&settings.mqtt.client_id, &settings.mqtt_host, settings.mqtt_port);
        mqtt_opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

        let command_topic = settings.mqtt.command_topic.clone();
        client
            .subscribe(&command_topic, QoS::AtLeastOnce)
            .await
            .context("Failed to subscribe to MQTT topic")?;
        info!("MQTT: subscribed to {command_topic}");

        let publisher = Arc::new(MqttStatePublisher::new(
            client.clone(),
            settings.mqtt.state_topic.clone(),
        ));
        let (sync_loop, listener) = sync::bridge(
            api,
            publisher,
            reporter,
            settings.account.clone(),
            settings.sync.clone(),
        );
        let listener = Arc::new(listener);

        // Task 1: alarm polling
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut sync_handle = tokio::spawn(sync_loop.run(shutdown_rx));

        // Task 2: MQTT event loop (receives messages, dispatches commands)
        let client_cmds = client.clone();
        let mqtt_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // rumqttc does not resubscribe on its own after a broker reconnect.
                        info!("MQTT: connected, subscribing to {command_topic}");
                        if let Err(e) = client_cmds.subscribe(&command_topic, QoS::AtLeastOnce).await
                        {
                            error!("Failed to subscribe to {command_topic}: {e}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        if msg.topic == command_topic {
                            let listener = Arc::clone(&listener);
                            tokio::spawn(async move {
                                if let Some(outcome) = listener.handle_message(&msg.payload).await {
                                    debug!("Command applied: {outcome:?}");
                                }
                            });
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT event loop error: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        info!("MQTT bridge running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
        let stop = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                Stop::Shutdown
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                Stop::Shutdown
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting connections...");
                Stop::Reload
            }
            joined = &mut sync_handle => Stop::SyncEnded(joined),
        };

        let restart = matches!(stop, Stop::Reload);
        let joined = match stop {
            Stop::SyncEnded(joined) => joined,
            Stop::Shutdown | Stop::Reload => {
                // Lets an in-flight poll finish before the bus goes away.
                let _ = shutdown_tx.send(true);
                sync_handle.await
            }
        };

        mqtt_handle.abort();
        if let Err(e) = client.disconnect().await {
            debug!("MQTT disconnect: {e}");
        }

        joined
            .context("Sync task panicked")?
            .context("Alarm sync stopped")?;

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure
        info!("Reloading config from {}", cli.config);
        match load_settings(&cli.config) {
            Ok(new_settings) => {
                settings = new_settings;
                info!("Config reloaded successfully");
            }
            Err(e) => warn!("Failed to reload config, keeping previous: {e:#}"),
        }

        info!("Reconnecting...");
    }

    info!("Shutdown complete");
    Ok(())
}
