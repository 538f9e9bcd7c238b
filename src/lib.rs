//! WhatsApp ↔ MQTT smart-home command bridge.
//!
//! Routes chat commands from a WhatsApp gateway to device command topics on
//! an MQTT broker: a per-user menu state machine, a passphrase shortcut
//! grammar, a connection-aware outbound send queue, and reconnect handling
//! for the chat session.

pub mod config;
pub mod device;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod lifecycle;
pub mod mqtt;
pub mod queue;
pub mod router;
pub mod session;
pub mod transport;

pub use config::Config;
pub use device::{Device, DeviceCommand, SwitchAction};
pub use error::{BridgeError, Result};
pub use gateway::{run_webhook, GatewaySender};
pub use lifecycle::{Bridge, BridgeEvent, ConnectionReadiness, Lifecycle};
pub use mqtt::MqttPublisher;
pub use queue::{OutboundTask, SendQueue};
pub use router::Router;
pub use session::{MemorySessionStore, SessionState, SessionStore};
pub use transport::{
    BrokerEvent, BrokerPublisher, ChatEvent, ChatTransport, CloseReason, InboundMessage,
};
