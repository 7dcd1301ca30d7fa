//! leafobd-engine - OBD-II telemetry acquisition for the Nissan Leaf
//!
//! The engine drives an ELM327-compatible adapter over a BLE GATT serial
//! bridge and turns proprietary Leaf PID replies into typed, validated
//! signals.
//!
//! Layering, bottom up:
//!
//! - [`transport`]: the [`transport::ObdLink`] byte pipe; BLE and mock
//!   implementations
//! - [`elm`]: ELM327 command encoding, reply delimiting and ISO-TP
//!   reassembly
//! - [`pid`]: the Leaf PID registry with declarative signal decoders
//! - [`session`]: the half-duplex session state machine (init ladder,
//!   header caching, link-loss classification)
//! - [`poll`]: cycle orchestration, per-signal failure recording and the
//!   snapshot seal
//!
//! A poll cycle never silently drops a signal: every signal of the
//! requested set appears in the snapshot, either with a value or with the
//! failure that prevented one.

pub mod config;
pub mod elm;
pub mod pid;
pub mod poll;
pub mod session;
pub mod transport;

pub use config::{EngineConfig, PidSet, PollConfig, TransportConfig};
pub use poll::{PollError, PollOrchestrator};
pub use session::{ConnectionState, ElmSession, SessionError};
pub use transport::{create_link, LinkEvent, MockLink, MockReply, ObdLink, TransportError};
