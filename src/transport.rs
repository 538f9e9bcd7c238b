//! Boundary traits and event types for the two transports.
//!
//! The core never talks to a wire protocol directly: the chat side is an
//! external gateway process consumed through [`ChatTransport`], the broker
//! side through [`BrokerPublisher`]. New transports only need to implement
//! these traits.

use crate::extract::MessagePayload;
use async_trait::async_trait;

/// Reserved identifier for broadcast status posts; always ignored.
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Inbound chat message as delivered by the transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Conversation identifier the message arrived on (and reply target).
    pub sender: String,
    /// Display name of the sender, when the transport knows it.
    pub push_name: Option<String>,
    /// Whether the bot's own account originated the message.
    pub from_me: bool,
    /// Raw nested payload.
    pub payload: MessagePayload,
}

/// Why the chat transport connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Session was invalidated; reconnecting cannot help until an operator
    /// re-authenticates the account.
    LoggedOut,
    /// Any other reason, kept verbatim for the log.
    Other(String),
}

impl CloseReason {
    /// Terminal reasons must not schedule a reconnect.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CloseReason::LoggedOut)
    }
}

/// Connection-state notification from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Pairing code is available; rendering is owned by the gateway.
    QrAvailable,
    /// Session is open and sends may be attempted.
    Open { own_id: String },
    /// Session closed.
    Close { reason: CloseReason },
}

/// Connection-state notification from the broker transport. Logged and
/// mirrored into the diagnostic readiness flag; the publish path re-checks
/// the live client at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerEvent {
    Connected,
    Disconnected,
}

/// Outbound chat operations the core requires.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send plain text to a conversation identifier.
    async fn send_text(&self, to: &str, text: &str) -> anyhow::Result<()>;

    /// Ask the transport to (re)establish its session. Progress arrives
    /// asynchronously as [`ChatEvent`]s.
    async fn connect(&self) -> anyhow::Result<()>;
}

/// Publish operations the core requires of the broker client.
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Live connection flag, checked at publish time.
    fn is_connected(&self) -> bool;

    /// Publish a payload to a topic and await the outcome.
    async fn publish(&self, topic: &str, payload: &str) -> anyhow::Result<()>;
}
