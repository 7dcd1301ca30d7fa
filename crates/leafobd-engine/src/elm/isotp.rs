//! ISO-TP (ISO 15765-2) reply reassembly
//!
//! Replies longer than 7 bytes arrive as a first frame carrying the total
//! length followed by consecutive frames with a 4-bit rolling index. The
//! adapter handles flow control on the bus; by the time frames reach us the
//! complete sequence is buffered, so any gap or reordering is a framing
//! fault, not something to wait out.

use super::codec::CodecError;

const PCI_SINGLE: u8 = 0x0;
const PCI_FIRST: u8 = 0x1;
const PCI_CONSECUTIVE: u8 = 0x2;

/// One CAN frame as reported by the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub can_id: u16,
    pub data: Vec<u8>,
}

/// Reassemble a frame sequence into a single payload.
///
/// A single-frame reply yields its payload directly; when several ECUs
/// answer a functional request with single frames, the first responder wins.
pub fn reassemble(frames: &[RawFrame]) -> Result<Vec<u8>, CodecError> {
    let first = frames
        .first()
        .ok_or_else(|| CodecError::Malformed("empty frame sequence".into()))?;
    let pci = *first
        .data
        .first()
        .ok_or_else(|| CodecError::Malformed("empty frame".into()))?;

    match pci >> 4 {
        PCI_SINGLE => {
            let len = (pci & 0x0F) as usize;
            if len == 0 || first.data.len() < 1 + len {
                return Err(CodecError::Malformed(format!(
                    "single frame length {len} exceeds frame size {}",
                    first.data.len()
                )));
            }
            Ok(first.data[1..1 + len].to_vec())
        }
        PCI_FIRST => reassemble_multi(first, &frames[1..]),
        other => Err(CodecError::Malformed(format!(
            "unexpected PCI type {other:#x}"
        ))),
    }
}

fn reassemble_multi(first: &RawFrame, rest: &[RawFrame]) -> Result<Vec<u8>, CodecError> {
    let len_high = first.data[0] & 0x0F;
    let len_low = *first
        .data
        .get(1)
        .ok_or_else(|| CodecError::Malformed("first frame too short".into()))?;
    let total = ((len_high as usize) << 8) | len_low as usize;
    if total <= 7 {
        return Err(CodecError::Malformed(format!(
            "first frame announces single-frame length {total}"
        )));
    }

    let mut payload = first.data[2..].to_vec();
    let mut expected_index = 1u8;
    for frame in rest {
        if frame.can_id != first.can_id {
            return Err(CodecError::Malformed(format!(
                "responder {:03X} interleaved into multi-frame reply from {:03X}",
                frame.can_id, first.can_id
            )));
        }
        let pci = *frame
            .data
            .first()
            .ok_or_else(|| CodecError::Malformed("empty consecutive frame".into()))?;
        if pci >> 4 != PCI_CONSECUTIVE {
            return Err(CodecError::Malformed(format!(
                "expected consecutive frame, got PCI {pci:#04x}"
            )));
        }
        if pci & 0x0F != expected_index {
            return Err(CodecError::Malformed(format!(
                "consecutive frame index {} out of order, expected {expected_index}",
                pci & 0x0F
            )));
        }
        payload.extend_from_slice(&frame.data[1..]);
        expected_index = (expected_index + 1) & 0x0F;
    }

    if payload.len() < total {
        return Err(CodecError::Malformed(format!(
            "multi-frame reply truncated: got {} of {total} bytes",
            payload.len()
        )));
    }
    payload.truncate(total);
    Ok(payload)
}
