//! Adapter transports
//!
//! The session talks to the ELM327 through the [`ObdLink`] trait; concrete
//! links are selected from configuration. The BLE link is feature-gated so
//! headless test builds need no Bluetooth stack.

#[cfg(feature = "ble")]
mod ble;
mod error;
mod link;
mod mock;

#[cfg(feature = "ble")]
pub use ble::BleLink;
pub use error::TransportError;
pub use link::{LinkEvent, ObdLink};
pub use mock::{MockLink, MockReply};

use std::sync::Arc;

use crate::config::TransportConfig;

/// Build a link from configuration
pub fn create_link(config: &TransportConfig) -> Result<Arc<dyn ObdLink>, TransportError> {
    match config {
        #[cfg(feature = "ble")]
        TransportConfig::Ble(ble) => Ok(Arc::new(BleLink::new(ble.clone()))),
        #[cfg(not(feature = "ble"))]
        TransportConfig::Ble(_) => Err(TransportError::Unsupported(
            "ble support not compiled in".to_owned(),
        )),
        TransportConfig::Mock(mock) => Ok(Arc::new(MockLink::new(mock.clone()))),
    }
}
