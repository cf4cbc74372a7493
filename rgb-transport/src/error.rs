//! Transport error types

use thiserror::Error;

/// Errors that can occur while talking to an OpenRGB server
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(u32),
}

impl TransportError {
    /// Whether the underlying socket should be considered dead
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            TransportError::Connect { .. } | TransportError::Io(_) | TransportError::Timeout(_)
        )
    }
}
