//! End-to-end tests for the Leaf OBD telemetry engine.
//!
//! Everything runs against the scripted mock link, so the suite covers the
//! full stack from command encoding down to snapshot sealing without any
//! hardware:
//!
//! - `tests/e2e_test.rs`: complete poll cycles, failure classification,
//!   link-loss recovery and snapshot serialization
