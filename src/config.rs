//! Environment-driven configuration.
//!
//! All values are read once at startup and held immutable for the process
//! lifetime. The broker URL is the only hard requirement; everything else
//! falls back to the defaults of the deployed bot.

use crate::device::Device;
use crate::error::{BridgeError, Result};
use std::time::Duration;

/// Immutable process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// MQTT broker URL, e.g. `mqtt://broker.local:1883`. Required.
    pub mqtt_url: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    topic_lampu1: String,
    topic_lampu2: String,
    topic_stopkontak1: String,
    topic_stopkontak2: String,
    /// Shared secret prefix for the any-state quick command.
    pub passphrase: String,
    /// Delay before a chat-transport reconnect attempt.
    pub reconnect_delay: Duration,
    /// Grace period for transport teardown before a forced exit.
    pub shutdown_timeout: Duration,
    /// Bind address for the inbound webhook server.
    pub webhook_bind: String,
    /// Base URL of the external WhatsApp gateway process.
    pub chat_gateway_url: String,
    /// Optional bearer token shared with the gateway, both directions.
    pub chat_gateway_token: Option<String>,
}

fn default_topic(device: Device) -> String {
    format!("smarthome/{}/perintah", device.name())
}

impl Config {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Empty values are
    /// treated as unset, matching dotenv conventions.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mqtt_url = get("MQTT_URL")
            .ok_or_else(|| BridgeError::Config("MQTT_URL is not set".to_owned()))?;

        let secs = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| BridgeError::Config(format!("{key} must be a number of seconds"))),
                None => Ok(default),
            }
        };

        Ok(Self {
            mqtt_url,
            mqtt_username: get("MQTT_USERNAME"),
            mqtt_password: get("MQTT_PASSWORD"),
            topic_lampu1: get("MQTT_TOPIC_LAMPU1").unwrap_or_else(|| default_topic(Device::Lampu1)),
            topic_lampu2: get("MQTT_TOPIC_LAMPU2").unwrap_or_else(|| default_topic(Device::Lampu2)),
            topic_stopkontak1: get("MQTT_TOPIC_STOPKONTAK1")
                .unwrap_or_else(|| default_topic(Device::Stopkontak1)),
            topic_stopkontak2: get("MQTT_TOPIC_STOPKONTAK2")
                .unwrap_or_else(|| default_topic(Device::Stopkontak2)),
            passphrase: get("PASS_PHRASE").unwrap_or_else(|| "1234".to_owned()),
            reconnect_delay: Duration::from_secs(secs("RECONNECT_DELAY_SECS", 10)?),
            shutdown_timeout: Duration::from_secs(secs("SHUTDOWN_TIMEOUT_SECS", 3)?),
            webhook_bind: get("WEBHOOK_BIND").unwrap_or_else(|| "127.0.0.1:4090".to_owned()),
            chat_gateway_url: get("CHAT_GATEWAY_URL")
                .unwrap_or_else(|| "http://127.0.0.1:3001".to_owned()),
            chat_gateway_token: get("CHAT_GATEWAY_TOKEN"),
        })
    }

    /// Broker topic for a device. Total over the closed device set, so the
    /// router can rely on every validated command having a destination.
    #[must_use]
    pub fn topic(&self, device: Device) -> &str {
        match device {
            Device::Lampu1 => &self.topic_lampu1,
            Device::Lampu2 => &self.topic_lampu2,
            Device::Stopkontak1 => &self.topic_stopkontak1,
            Device::Stopkontak2 => &self.topic_stopkontak2,
        }
    }
}
