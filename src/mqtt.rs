//! MQTT broker client behind the [`BrokerPublisher`] trait.
//!
//! The rumqttc event loop runs in a background task that keeps the shared
//! connected flag current and reports connect/disconnect transitions to the
//! bridge. Publishing goes through the async client handle and awaits the
//! client-side outcome.

use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::lifecycle::BridgeEvent;
use crate::transport::{BrokerEvent, BrokerPublisher};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CLIENT_ID: &str = "wa-iot-bridge";
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Split `mqtt://host:port` (or `tcp://`, or bare `host:port`) into parts.
/// The port defaults to 1883.
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);
    match stripped.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| BridgeError::Config(format!("invalid MQTT port in \"{url}\"")))?;
            Ok((host.to_owned(), port))
        }
        None => Ok((stripped.to_owned(), 1883)),
    }
}

/// rumqttc-backed broker publisher.
pub struct MqttPublisher {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttPublisher {
    /// Build the client and spawn its event-loop task. rumqttc reconnects on
    /// its own each time the loop is polled after an error; the task just
    /// paces those retries and mirrors the state out.
    pub fn connect(config: &Config, events_tx: mpsc::Sender<BridgeEvent>) -> Result<Self> {
        let (host, port) = parse_mqtt_url(&config.mqtt_url)?;
        let mut options = MqttOptions::new(CLIENT_ID, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        if let (Some(user), Some(pass)) = (&config.mqtt_username, &config.mqtt_password) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, mut event_loop) = AsyncClient::new(options, 256);
        let connected = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&connected);
        tokio::spawn(async move {
            let mut was_connected = false;
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        flag.store(true, Ordering::SeqCst);
                        if !was_connected {
                            was_connected = true;
                            if events_tx
                                .send(BridgeEvent::Broker(BrokerEvent::Connected))
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        flag.store(false, Ordering::SeqCst);
                        if was_connected {
                            was_connected = false;
                            if events_tx
                                .send(BridgeEvent::Broker(BrokerEvent::Disconnected))
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                        tracing::warn!("mqtt event loop error: {err}");
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    }
                }
            }
        });

        Ok(Self { client, connected })
    }

    /// Cleanly disconnect from the broker. Used on shutdown only.
    pub async fn disconnect(&self) {
        if let Err(err) = self.client.disconnect().await {
            tracing::warn!("mqtt disconnect failed: {err}");
        }
    }
}

#[async_trait]
impl BrokerPublisher for MqttPublisher {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: &str) -> anyhow::Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}
