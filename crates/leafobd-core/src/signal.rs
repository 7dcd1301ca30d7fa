//! Decoded vehicle signals and per-signal validity

use serde::{Deserialize, Serialize};

/// Validity of a decoded signal within one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    /// Value decoded and within its plausible range
    Ok,
    /// Value decoded but outside its plausible range; the raw number is
    /// still reported so the consumer can decide whether to discard it
    OutOfRange,
    /// Response framing or payload structure was invalid
    MalformedFrame,
    /// No response within the per-request deadline
    Timeout,
    /// Adapter or vehicle reported the PID as unavailable (NO DATA)
    NotSupported,
    /// Connection dropped while this request was in flight
    LinkLost,
}

impl Validity {
    /// Whether the signal carries a usable value (`Ok` or `OutOfRange`)
    pub fn has_value(&self) -> bool {
        matches!(self, Validity::Ok | Validity::OutOfRange)
    }
}

/// The semantic kinds a decoded signal can take
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl SignalValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SignalValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SignalValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SignalValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for SignalValue {
    fn from(v: f64) -> Self {
        SignalValue::Number(v)
    }
}

impl From<bool> for SignalValue {
    fn from(v: bool) -> Self {
        SignalValue::Bool(v)
    }
}

/// One named vehicle signal decoded from a PID response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedSignal {
    /// Decoded value; absent for signals that failed before decoding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<SignalValue>,
    /// Unit of measurement (e.g., "km/h", "V", "%"); empty for bool/enum
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub validity: Validity,
}

impl DecodedSignal {
    /// A successfully decoded signal
    pub fn ok(value: impl Into<SignalValue>, unit: Option<&str>) -> Self {
        Self {
            value: Some(value.into()),
            unit: unit.map(str::to_owned),
            validity: Validity::Ok,
        }
    }

    /// A decoded value outside its plausible range; the raw number is kept
    pub fn out_of_range(value: impl Into<SignalValue>, unit: Option<&str>) -> Self {
        Self {
            value: Some(value.into()),
            unit: unit.map(str::to_owned),
            validity: Validity::OutOfRange,
        }
    }

    /// A signal that failed with the given validity, carrying no value
    pub fn failed(validity: Validity) -> Self {
        debug_assert!(!validity.has_value());
        Self {
            value: None,
            unit: None,
            validity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_keeps_raw_value() {
        let sig = DecodedSignal::out_of_range(105.0, Some("%"));
        assert_eq!(sig.validity, Validity::OutOfRange);
        assert_eq!(sig.value.unwrap().as_f64(), Some(105.0));
    }

    #[test]
    fn failed_signal_has_no_value() {
        let sig = DecodedSignal::failed(Validity::Timeout);
        assert!(sig.value.is_none());
        assert!(!sig.validity.has_value());
    }

    #[test]
    fn signal_value_serializes_untagged() {
        let json = serde_json::to_string(&SignalValue::Number(50.0)).unwrap();
        assert_eq!(json, "50.0");
        let json = serde_json::to_string(&SignalValue::Text("drive".into())).unwrap();
        assert_eq!(json, "\"drive\"");
    }
}
