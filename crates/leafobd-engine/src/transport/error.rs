//! Transport layer errors

use thiserror::Error;

/// Errors raised by the adapter link
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("link is not open")]
    NotConnected,

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("link closed by peer")]
    Closed,

    #[error("no usable Bluetooth adapter found")]
    NoAdapter,

    #[error("peripheral does not expose a known serial profile: {0}")]
    ProfileNotFound(String),

    #[error("transport not supported in this build: {0}")]
    Unsupported(String),
}
