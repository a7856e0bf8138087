// MIT License - Copyright (c) 2026 Peter Wright
// Error types

/// All errors that can occur in the keybus bridge library.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keybus link disconnected")]
    Disconnected,

    #[error("Keybus write channel not ready after {waited_ms}ms")]
    WriteTimeout { waited_ms: u64 },

    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),

    #[error("MQTT connection refused: {code:?}")]
    ConnectionRefused { code: rumqttc::ConnectReturnCode },

    #[error("Not connected to MQTT broker")]
    NotConnected,
}

impl BridgeError {
    /// Whether this error is transient and the operation may succeed on a later cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Io(_)
                | BridgeError::Disconnected
                | BridgeError::WriteTimeout { .. }
                | BridgeError::MqttConnection(_)
                | BridgeError::NotConnected
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
