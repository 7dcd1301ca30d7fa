//! Engine configuration

use serde::{Deserialize, Serialize};

/// Top-level configuration for the acquisition engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Link to the ELM327 adapter
    #[serde(default)]
    pub transport: TransportConfig,
    /// Poll cycle behaviour
    #[serde(default)]
    pub poll: PollConfig,
}

/// Transport selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// BLE GATT serial link to a real adapter
    Ble(BleConfig),
    /// In-process mock link with scripted replies
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Mock(MockConfig::default())
    }
}

/// BLE link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BleConfig {
    /// Adapter MAC address, e.g. "AA:BB:CC:DD:EE:FF"
    pub address: String,
    /// GATT profile of the adapter; probed from the discovered services
    /// when not set
    #[serde(default)]
    pub profile: Option<GattProfile>,
    /// How long to scan and connect before giving up
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Known BLE serial-bridge GATT profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GattProfile {
    /// LELink and compatible clones (service FFE0)
    LeLink,
    /// Veepeak and compatible clones (service FFF0)
    Veepeak,
    /// Nordic UART service
    NordicUart,
}

/// Mock link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Delay before each scripted reply is delivered
    #[serde(default)]
    pub latency_ms: u64,
    /// Replies are delivered in chunks of this many bytes to exercise
    /// partial-read handling
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            chunk_size: default_chunk_size(),
        }
    }
}

/// Poll cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Which PID set to poll each cycle
    #[serde(default)]
    pub pid_set: PidSet,
    /// Per-request response deadline
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Settle time after ATZ before the adapter accepts commands
    #[serde(default = "default_reset_settle_ms")]
    pub reset_settle_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            pid_set: PidSet::default(),
            request_timeout_ms: default_request_timeout_ms(),
            reset_settle_ms: default_reset_settle_ms(),
        }
    }
}

/// Named PID sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PidSet {
    /// Every registered PID
    #[default]
    Full,
    /// Battery and odometer only, for charge monitoring
    Reduced,
}

fn default_connect_timeout_ms() -> u64 {
    20_000
}

fn default_chunk_size() -> usize {
    20
}

fn default_request_timeout_ms() -> u64 {
    2_000
}

fn default_reset_settle_ms() -> u64 {
    1_000
}
