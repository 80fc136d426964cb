//! Event bus errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Event bus is not connected")]
    NotConnected,

    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Broker command error: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported broker address: {0}")]
    UnsupportedBroker(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            BusError::Connection(err.to_string())
        } else {
            BusError::Command(err.to_string())
        }
    }
}
