//! leafobd-core - Signal and snapshot types for the Leaf OBD telemetry engine
//!
//! This crate provides the data model shared between the acquisition engine
//! and its consumers: decoded vehicle signals, per-signal validity, and the
//! immutable per-cycle snapshot.

pub mod signal;
pub mod snapshot;

pub use signal::{DecodedSignal, SignalValue, Validity};
pub use snapshot::{SnapshotBuilder, VehicleSnapshot};
