//! PID definitions and payload decoding
//!
//! Each [`PidRequest`] names the CAN request header, the command string and
//! the signals carried by the reply. Decoders are declarative byte-field
//! extractions so new PIDs are a registry entry, not new code.

mod registry;

pub use registry::{full_set, lookup, reduced_set};

use leafobd_core::{DecodedSignal, SignalValue, Validity};

/// One pollable PID
#[derive(Debug)]
pub struct PidRequest {
    /// Registry key, e.g. "lbc"
    pub key: &'static str,
    pub description: &'static str,
    /// CAN request header as sent to `AT SH`, e.g. "79B"
    pub header: &'static str,
    /// Command string sent on the wire, length prefix included
    pub command: &'static str,
    /// Expected leading bytes of the reassembled payload (positive response
    /// service id plus the echoed identifier)
    pub response_prefix: &'static [u8],
    /// Exact reassembled payload length, prefix included
    pub expect_len: usize,
    /// Response frame count, when fixed, for the adapter's early-return hint
    pub frames_hint: Option<u8>,
    pub signals: &'static [SignalSpec],
}

impl PidRequest {
    pub fn signal_names(&self) -> Vec<&'static str> {
        self.signals.iter().map(|s| s.name).collect()
    }
}

/// One signal extracted from a PID reply
#[derive(Debug)]
pub struct SignalSpec {
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub decoder: Decoder,
    /// Plausible range; decoded numbers outside it are flagged, not dropped
    pub range: Option<(f64, f64)>,
}

/// Declarative byte-field decoders
#[derive(Debug)]
pub enum Decoder {
    /// Big-endian unsigned field, then `raw * scale + bias`
    Unsigned {
        offset: usize,
        len: usize,
        scale: f64,
        bias: f64,
    },
    /// Big-endian two's-complement field, then `raw * scale + bias`
    Signed {
        offset: usize,
        len: usize,
        scale: f64,
        bias: f64,
    },
    /// Single bit as a boolean
    Flag { offset: usize, mask: u8 },
    /// Byte mapped through an enum table
    Map {
        offset: usize,
        table: &'static [(u8, &'static str)],
    },
}

/// UDS negative response service id
const NEGATIVE_RESPONSE: u8 = 0x7F;

/// Decode a reassembled payload into this PID's signals.
///
/// Structural problems (wrong echo, wrong length, negative response) fail
/// every signal of the request; a decoded value outside its plausible range
/// fails only that signal, and keeps the raw number.
pub fn decode_payload(
    request: &PidRequest,
    payload: &[u8],
) -> Vec<(&'static str, DecodedSignal)> {
    if payload.first() == Some(&NEGATIVE_RESPONSE) {
        return fail_all(request, Validity::NotSupported);
    }
    if !payload.starts_with(request.response_prefix) || payload.len() != request.expect_len {
        return fail_all(request, Validity::MalformedFrame);
    }

    request
        .signals
        .iter()
        .map(|spec| (spec.name, decode_signal(spec, payload)))
        .collect()
}

fn fail_all(request: &PidRequest, validity: Validity) -> Vec<(&'static str, DecodedSignal)> {
    request
        .signals
        .iter()
        .map(|spec| (spec.name, DecodedSignal::failed(validity)))
        .collect()
}

fn decode_signal(spec: &SignalSpec, payload: &[u8]) -> DecodedSignal {
    match &spec.decoder {
        Decoder::Unsigned {
            offset,
            len,
            scale,
            bias,
        } => match read_uint(payload, *offset, *len) {
            Some(raw) => number_signal(spec, raw as f64 * scale + bias),
            None => DecodedSignal::failed(Validity::MalformedFrame),
        },
        Decoder::Signed {
            offset,
            len,
            scale,
            bias,
        } => match read_int(payload, *offset, *len) {
            Some(raw) => number_signal(spec, raw as f64 * scale + bias),
            None => DecodedSignal::failed(Validity::MalformedFrame),
        },
        Decoder::Flag { offset, mask } => match payload.get(*offset) {
            Some(byte) => DecodedSignal::ok(byte & mask != 0, spec.unit),
            None => DecodedSignal::failed(Validity::MalformedFrame),
        },
        Decoder::Map { offset, table } => match payload.get(*offset) {
            Some(byte) => match table.iter().find(|(k, _)| k == byte) {
                Some((_, label)) => DecodedSignal::ok(
                    SignalValue::Text((*label).to_owned()),
                    spec.unit,
                ),
                None => DecodedSignal::failed(Validity::MalformedFrame),
            },
            None => DecodedSignal::failed(Validity::MalformedFrame),
        },
    }
}

fn number_signal(spec: &SignalSpec, value: f64) -> DecodedSignal {
    match spec.range {
        Some((min, max)) if value < min || value > max => {
            DecodedSignal::out_of_range(value, spec.unit)
        }
        _ => DecodedSignal::ok(value, spec.unit),
    }
}

fn read_uint(payload: &[u8], offset: usize, len: usize) -> Option<u64> {
    if len == 0 || len > 8 {
        return None;
    }
    let bytes = payload.get(offset..offset + len)?;
    Some(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

fn read_int(payload: &[u8], offset: usize, len: usize) -> Option<i64> {
    let raw = read_uint(payload, offset, len)?;
    let shift = 64 - (len as u32) * 8;
    Some(((raw << shift) as i64) >> shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get<'a>(
        decoded: &'a [(&'static str, DecodedSignal)],
        name: &str,
    ) -> &'a DecodedSignal {
        &decoded.iter().find(|(n, _)| *n == name).unwrap().1
    }

    fn lbc_payload() -> Vec<u8> {
        let mut payload = vec![0u8; 53];
        payload[0] = 0x61;
        payload[1] = 0x01;
        // pack current -10 A: -10 * 1024 as two's-complement s32
        payload[2..6].copy_from_slice(&(-10240i32).to_be_bytes());
        // pack voltage 360.00 V
        payload[20..22].copy_from_slice(&36000u16.to_be_bytes());
        // state of health 91.50390625 %
        payload[30..32].copy_from_slice(&9370u16.to_be_bytes());
        // state of charge 84.5 %
        payload[33..36].copy_from_slice(&845_000u32.to_be_bytes()[1..]);
        // capacity 55.3 Ah
        payload[37..40].copy_from_slice(&553_000u32.to_be_bytes()[1..]);
        payload
    }

    #[test]
    fn battery_controller_payload_decodes_all_signals() {
        let request = lookup("lbc").unwrap();
        let decoded = decode_payload(request, &lbc_payload());

        let soc = get(&decoded, "state_of_charge_pct");
        assert_eq!(soc.validity, Validity::Ok);
        assert!((soc.value.as_ref().unwrap().as_f64().unwrap() - 84.5).abs() < 1e-9);

        let current = get(&decoded, "battery_pack_current");
        assert!((current.value.as_ref().unwrap().as_f64().unwrap() + 10.0).abs() < 1e-9);

        let voltage = get(&decoded, "battery_pack_voltage");
        assert!((voltage.value.as_ref().unwrap().as_f64().unwrap() - 360.0).abs() < 1e-9);
        assert_eq!(voltage.unit.as_deref(), Some("V"));

        let capacity = get(&decoded, "battery_capacity_ah");
        assert!((capacity.value.as_ref().unwrap().as_f64().unwrap() - 55.3).abs() < 1e-9);
    }

    #[test]
    fn implausible_soc_is_flagged_but_kept() {
        let request = lookup("lbc").unwrap();
        let mut payload = lbc_payload();
        // 105 % state of charge
        payload[33..36].copy_from_slice(&1_050_000u32.to_be_bytes()[1..]);
        let decoded = decode_payload(request, &payload);

        let soc = get(&decoded, "state_of_charge_pct");
        assert_eq!(soc.validity, Validity::OutOfRange);
        assert!((soc.value.as_ref().unwrap().as_f64().unwrap() - 105.0).abs() < 1e-9);
        // the structural fields are unaffected
        assert_eq!(get(&decoded, "battery_pack_voltage").validity, Validity::Ok);
    }

    #[test]
    fn wrong_echo_fails_every_signal() {
        let request = lookup("lbc").unwrap();
        let mut payload = lbc_payload();
        payload[1] = 0x02;
        let decoded = decode_payload(request, &payload);
        assert!(decoded
            .iter()
            .all(|(_, s)| s.validity == Validity::MalformedFrame));
    }

    #[test]
    fn wrong_length_fails_every_signal() {
        let request = lookup("odometer").unwrap();
        let decoded = decode_payload(request, &[0x62, 0x0E, 0x01, 0x01]);
        assert!(decoded
            .iter()
            .all(|(_, s)| s.validity == Validity::MalformedFrame));
    }

    #[test]
    fn negative_response_maps_to_not_supported() {
        let request = lookup("odometer").unwrap();
        let decoded = decode_payload(request, &[0x7F, 0x22, 0x31]);
        assert!(decoded
            .iter()
            .all(|(_, s)| s.validity == Validity::NotSupported));
    }

    #[test]
    fn gear_position_maps_through_table() {
        let request = lookup("gear_position").unwrap();
        let decoded = decode_payload(request, &[0x62, 0x11, 0x56, 0x04]);
        let gear = get(&decoded, "gear_position");
        assert_eq!(gear.value.as_ref().unwrap().as_text(), Some("drive"));

        let decoded = decode_payload(request, &[0x62, 0x11, 0x56, 0x09]);
        assert_eq!(
            get(&decoded, "gear_position").validity,
            Validity::MalformedFrame
        );
    }

    #[test]
    fn drive_mode_flags_decode_to_booleans() {
        let request = lookup("drive_mode").unwrap();
        let decoded = decode_payload(request, &[0x62, 0x11, 0x4E, 0x14]);
        assert_eq!(
            get(&decoded, "eco_mode").value.as_ref().unwrap().as_bool(),
            Some(true)
        );
        assert_eq!(
            get(&decoded, "e_pedal_mode").value.as_ref().unwrap().as_bool(),
            Some(true)
        );

        let decoded = decode_payload(request, &[0x62, 0x11, 0x4E, 0x00]);
        assert_eq!(
            get(&decoded, "eco_mode").value.as_ref().unwrap().as_bool(),
            Some(false)
        );
    }

    #[test]
    fn vehicle_speed_decodes_standard_reply() {
        let request = lookup("vehicle_speed").unwrap();
        let decoded = decode_payload(request, &[0x41, 0x0D, 0x32]);
        let speed = get(&decoded, "vehicle_speed_kmh");
        assert_eq!(speed.validity, Validity::Ok);
        assert_eq!(speed.value.as_ref().unwrap().as_f64(), Some(50.0));
    }

    #[test]
    fn short_payload_never_panics() {
        for request in full_set() {
            let decoded = decode_payload(request, &[]);
            assert_eq!(decoded.len(), request.signals.len());
        }
    }
}
