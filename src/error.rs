//! Error types for the bridge.

/// Top-level error type for the WhatsApp/MQTT bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Missing or invalid startup configuration.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BridgeError>;
