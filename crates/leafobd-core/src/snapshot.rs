//! Per-cycle vehicle snapshots

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signal::{DecodedSignal, Validity};

/// The immutable result of one poll cycle: signal name -> decoded signal,
/// plus a single capture timestamp.
///
/// Built through [`SnapshotBuilder`]; once `finish()` has run the map can no
/// longer be mutated, so a failed poll either produces a snapshot with
/// per-signal error markers or no snapshot at all — never a silently stale
/// value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    /// When this cycle was captured
    pub captured_at: DateTime<Utc>,
    signals: BTreeMap<String, DecodedSignal>,
}

impl VehicleSnapshot {
    pub fn get(&self, name: &str) -> Option<&DecodedSignal> {
        self.signals.get(name)
    }

    pub fn signals(&self) -> impl Iterator<Item = (&str, &DecodedSignal)> {
        self.signals.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Number of signals that carry a usable value
    pub fn valid_count(&self) -> usize {
        self.signals
            .values()
            .filter(|s| s.validity.has_value())
            .count()
    }
}

/// Accumulates decoded signals during a poll cycle
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    signals: BTreeMap<String, DecodedSignal>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signal. Duplicate keys are a registry bug; the first value
    /// wins and the duplicate is dropped.
    pub fn record(&mut self, name: &str, signal: DecodedSignal) {
        if self.signals.contains_key(name) {
            debug_assert!(false, "duplicate signal key: {name}");
            return;
        }
        self.signals.insert(name.to_owned(), signal);
    }

    /// Record the same failure validity for a list of signal names
    pub fn record_failed(&mut self, names: &[&str], validity: Validity) {
        for name in names {
            self.record(name, DecodedSignal::failed(validity));
        }
    }

    /// Seal the snapshot, stamping it with the current time
    pub fn finish(self) -> VehicleSnapshot {
        VehicleSnapshot {
            captured_at: Utc::now(),
            signals: self.signals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_seals_signals() {
        let mut b = SnapshotBuilder::new();
        b.record("vehicle_speed_kmh", DecodedSignal::ok(50.0, Some("km/h")));
        b.record_failed(&["odometer_km"], Validity::Timeout);
        let snap = b.finish();

        assert_eq!(snap.len(), 2);
        assert_eq!(snap.valid_count(), 1);
        assert_eq!(
            snap.get("odometer_km").unwrap().validity,
            Validity::Timeout
        );
    }

    #[test]
    fn duplicate_key_keeps_first() {
        let mut b = SnapshotBuilder::new();
        b.record("motor_rpm", DecodedSignal::ok(1000.0, Some("rpm")));
        // debug_assert fires in debug builds; release keeps the first value
        if cfg!(not(debug_assertions)) {
            b.record("motor_rpm", DecodedSignal::ok(2000.0, Some("rpm")));
        }
        let snap = b.finish();
        assert_eq!(
            snap.get("motor_rpm").unwrap().value.as_ref().unwrap().as_f64(),
            Some(1000.0)
        );
    }
}
