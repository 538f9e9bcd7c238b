use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use wa_iot_bridge::transport::ChatTransport;
use wa_iot_bridge::{Bridge, Config, GatewaySender, MqttPublisher};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(Config::from_env().context("configuration")?);

    let (events_tx, events_rx) = mpsc::channel(64);

    let broker =
        Arc::new(MqttPublisher::connect(&config, events_tx.clone()).context("mqtt client")?);
    let chat = Arc::new(GatewaySender::new(
        &config.chat_gateway_url,
        config.chat_gateway_token.clone(),
    ));

    tokio::spawn({
        let bind = config.webhook_bind.clone();
        let tx = events_tx.clone();
        let token = config.chat_gateway_token.clone();
        async move {
            if let Err(err) = wa_iot_bridge::run_webhook(&bind, tx, token).await {
                tracing::error!("webhook server failed: {err}");
            }
        }
    });

    // The gateway must at least accept the connect request; readiness itself
    // arrives later through the connection webhook.
    chat.connect().await.context("initial gateway connect")?;

    let mut bridge = Bridge::new(
        Arc::clone(&config),
        chat.clone(),
        broker.clone(),
        events_tx,
        events_rx,
    );

    tokio::select! {
        () = bridge.run() => {
            tracing::warn!("event channel closed; shutting down");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("listening for shutdown signal")?;
            tracing::info!("SIGINT received; shutting down");
        }
    }

    bridge.shutdown();
    if tokio::time::timeout(config.shutdown_timeout, broker.disconnect())
        .await
        .is_err()
    {
        tracing::warn!("shutdown grace period elapsed; exiting immediately");
        std::process::exit(1);
    }
    Ok(())
}
