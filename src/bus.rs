// MIT License - Copyright (c) 2026 Peter Wright
// Message bus side: state publication over MQTT

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::state::BusAlarmState;

/// Where translated alarm states go.
#[async_trait]
pub trait StatePublisher: Send + Sync {
    async fn publish_state(&self, state: BusAlarmState) -> Result<()>;
}

/// Publishes the state retained with at-least-once delivery, so late
/// subscribers immediately see the last known state.
pub struct MqttStatePublisher {
    client: AsyncClient,
    topic: String,
}

impl MqttStatePublisher {
    pub fn new(client: AsyncClient, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl StatePublisher for MqttStatePublisher {
    async fn publish_state(&self, state: BusAlarmState) -> Result<()> {
        debug!("Publishing {state:?} to {}", self.topic);
        self.client
            .publish(&self.topic, QoS::AtLeastOnce, true, state.as_payload())
            .await?;
        Ok(())
    }
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
///
/// `tcp://` and a bare `host:port` are accepted too; the port defaults to 1883.
pub fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url)
        .trim_end_matches('/');

    let (host, port) = match stripped.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str.parse::<u16>().map_err(|_| BridgeError::Parse {
                details: format!("invalid MQTT port in {url:?}"),
            })?;
            (host, port)
        }
        None => (stripped, 1883),
    };
    if host.is_empty() {
        return Err(BridgeError::Parse {
            details: format!("missing MQTT host in {url:?}"),
        });
    }
    Ok((host.to_string(), port))
}
