//! HTTP adapter for the external chat gateway.
//!
//! Inbound direction: an axum webhook the gateway process POSTs messages and
//! connection-state changes to; both are forwarded onto the bridge event
//! channel. Outbound direction: [`GatewaySender`] implements
//! [`ChatTransport`] over the gateway's REST surface. A shared bearer token
//! guards both directions when configured.

use crate::error::Result;
use crate::extract::MessagePayload;
use crate::lifecycle::BridgeEvent;
use crate::transport::{ChatEvent, ChatTransport, CloseReason, InboundMessage};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::mpsc;

#[derive(Clone)]
struct GatewayState {
    events_tx: mpsc::Sender<BridgeEvent>,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InboundBody {
    sender: String,
    #[serde(rename = "pushName", default)]
    push_name: Option<String>,
    #[serde(rename = "fromMe", default)]
    from_me: bool,
    message: MessagePayload,
}

#[derive(Debug, Deserialize)]
struct ConnectionBody {
    state: String,
    #[serde(rename = "ownId", default)]
    own_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(rename = "loggedOut", default)]
    logged_out: bool,
}

fn bearer_is_valid(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

async fn health() -> &'static str {
    "ok"
}

async fn inbound(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<InboundBody>,
) -> StatusCode {
    if !bearer_is_valid(&headers, state.token.as_deref()) {
        return StatusCode::UNAUTHORIZED;
    }
    let message = InboundMessage {
        sender: body.sender,
        push_name: body.push_name,
        from_me: body.from_me,
        payload: body.message,
    };
    if state
        .events_tx
        .send(BridgeEvent::Inbound(message))
        .await
        .is_err()
    {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

async fn connection(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<ConnectionBody>,
) -> StatusCode {
    if !bearer_is_valid(&headers, state.token.as_deref()) {
        return StatusCode::UNAUTHORIZED;
    }
    let event = match body.state.as_str() {
        "qr" => ChatEvent::QrAvailable,
        "open" => match body.own_id {
            Some(own_id) => ChatEvent::Open { own_id },
            None => return StatusCode::BAD_REQUEST,
        },
        "close" => {
            let reason = if body.logged_out {
                CloseReason::LoggedOut
            } else {
                CloseReason::Other(body.reason.unwrap_or_else(|| "unknown".to_owned()))
            };
            ChatEvent::Close { reason }
        }
        _ => return StatusCode::BAD_REQUEST,
    };
    if state
        .events_tx
        .send(BridgeEvent::Chat(event))
        .await
        .is_err()
    {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

fn webhook_router(events_tx: mpsc::Sender<BridgeEvent>, token: Option<String>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/inbound", post(inbound))
        .route("/connection", post(connection))
        .with_state(GatewayState { events_tx, token })
}

/// Serve the webhook until the process exits.
pub async fn run_webhook(
    bind: &str,
    events_tx: mpsc::Sender<BridgeEvent>,
    token: Option<String>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("gateway webhook listening on {}", listener.local_addr()?);
    axum::serve(listener, webhook_router(events_tx, token)).await?;
    Ok(())
}

/// Outbound half of the gateway adapter.
pub struct GatewaySender {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl GatewaySender {
    #[must_use]
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.post(format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }
}

#[async_trait]
impl ChatTransport for GatewaySender {
    async fn send_text(&self, to: &str, text: &str) -> anyhow::Result<()> {
        let response = self
            .request("/send")
            .json(&serde_json::json!({ "to": to, "text": text }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("gateway send failed: {status}: {body}");
        }
        Ok(())
    }

    async fn connect(&self) -> anyhow::Result<()> {
        let response = self.request("/connect").send().await?;
        if !response.status().is_success() {
            anyhow::bail!("gateway connect failed: {}", response.status());
        }
        Ok(())
    }
}
