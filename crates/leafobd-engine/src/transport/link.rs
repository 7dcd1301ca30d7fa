//! Adapter link abstraction
//!
//! An [`ObdLink`] is a byte pipe to an ELM327 adapter. Incoming bytes are
//! fanned out through a broadcast channel so the session can subscribe per
//! transaction and never see stale data from an earlier exchange.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::error::TransportError;

/// Events emitted by a link
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Bytes received from the adapter, in arrival order but with no
    /// framing guarantees
    Data(Vec<u8>),
    /// The link dropped; no further data will arrive until reopened
    Closed,
}

/// A byte-stream link to an ELM327 adapter
#[async_trait]
pub trait ObdLink: Send + Sync {
    /// Open the link. Idempotent: opening an open link is a no-op.
    async fn open(&self) -> Result<(), TransportError>;

    /// Close the link. Idempotent.
    async fn close(&self) -> Result<(), TransportError>;

    /// Write raw bytes to the adapter
    async fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to incoming link events. Only events arriving after the
    /// subscription are delivered.
    fn subscribe(&self) -> broadcast::Receiver<LinkEvent>;

    /// Whether the link is currently open
    fn is_open(&self) -> bool;
}
