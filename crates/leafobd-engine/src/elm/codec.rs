//! Command encoding and reply parsing

use thiserror::Error;

use super::isotp::{self, RawFrame};
use super::PROMPT;

/// Reply classification errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The adapter answered `NO DATA`: nothing on the bus responded
    #[error("no data: PID not answered on the bus")]
    NotSupported,
    /// The reply could not be parsed as CAN frames
    #[error("malformed reply: {0}")]
    Malformed(String),
}

/// Encode a command for the wire. `frames_hint`, when known, is appended so
/// the adapter returns as soon as that many response frames have arrived
/// instead of waiting out its response timer.
pub fn encode_command(command: &str, frames_hint: Option<u8>) -> Vec<u8> {
    match frames_hint {
        Some(count) if count > 0 && count <= 0xF => format!("{command}{count:X}\r").into_bytes(),
        _ => format!("{command}\r").into_bytes(),
    }
}

/// If the receive buffer contains a complete reply (prompt seen), split it
/// into cleaned lines. Returns `None` while the reply is still incomplete.
pub fn take_reply(buffer: &[u8]) -> Option<Vec<String>> {
    let prompt_at = buffer.iter().position(|&b| b == PROMPT)?;
    let text = String::from_utf8_lossy(&buffer[..prompt_at]);
    let lines = text
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect();
    Some(lines)
}

/// Whether an AT command reply contains the `OK` acknowledgement
pub fn reply_is_ok(lines: &[String]) -> bool {
    lines.iter().any(|line| line.eq_ignore_ascii_case("OK"))
}

/// Strings the adapter emits instead of data when something went wrong on
/// the CAN side. `NO DATA` is classified separately.
const ADAPTER_ERRORS: [&str; 8] = [
    "CAN ERROR",
    "BUS ERROR",
    "DATA ERROR",
    "BUFFER FULL",
    "UNABLE TO CONNECT",
    "FB ERROR",
    "STOPPED",
    "?",
];

/// Parse the data lines of an OBD query reply into raw CAN frames.
///
/// Echo lines (when `ATE0` did not stick) and `SEARCHING...` chatter are
/// skipped; adapter error strings are classified before hex parsing.
pub fn parse_frames(lines: &[String], command: &str) -> Result<Vec<RawFrame>, CodecError> {
    let mut frames = Vec::with_capacity(lines.len());
    for line in lines {
        let upper = line.to_ascii_uppercase();
        if upper == command.to_ascii_uppercase() || upper.starts_with("SEARCHING") {
            continue;
        }
        if upper == "NO DATA" {
            return Err(CodecError::NotSupported);
        }
        if ADAPTER_ERRORS.iter().any(|err| upper.contains(err)) {
            return Err(CodecError::Malformed(format!("adapter error: {line}")));
        }
        frames.push(parse_data_line(&upper)?);
    }
    if frames.is_empty() {
        return Err(CodecError::Malformed("reply carried no data lines".into()));
    }
    Ok(frames)
}

/// One line in `ATH1`/`ATS0` mode: 3 hex digits of CAN id, then frame bytes
fn parse_data_line(line: &str) -> Result<RawFrame, CodecError> {
    if line.len() < 5 || line.len() % 2 == 0 {
        return Err(CodecError::Malformed(format!("bad data line: {line}")));
    }
    let can_id = u16::from_str_radix(&line[..3], 16)
        .map_err(|_| CodecError::Malformed(format!("bad CAN id in line: {line}")))?;
    let data = hex::decode(&line[3..])
        .map_err(|_| CodecError::Malformed(format!("non-hex payload in line: {line}")))?;
    Ok(RawFrame { can_id, data })
}

/// Parse a full query reply and reassemble it into one payload
pub fn parse_payload(lines: &[String], command: &str) -> Result<Vec<u8>, CodecError> {
    let frames = parse_frames(lines, command)?;
    isotp::reassemble(&frames)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn take_reply_waits_for_prompt() {
        assert_eq!(take_reply(b"7E803410D"), None);
        let reply = take_reply(b"7E803410D32\r\r>").unwrap();
        assert_eq!(reply, vec!["7E803410D32"]);
    }

    #[test]
    fn take_reply_splits_multiple_lines() {
        let reply = take_reply(b"7BB1035610100000000\r7BB21000000000000\r\r>").unwrap();
        assert_eq!(reply.len(), 2);
    }

    #[test]
    fn encode_appends_frame_count_hint() {
        assert_eq!(encode_command("010D", Some(1)), b"010D1\r");
        assert_eq!(encode_command("022101", Some(8)), b"0221018\r");
        assert_eq!(encode_command("ATE0", None), b"ATE0\r");
    }

    #[test]
    fn no_data_classifies_as_not_supported() {
        let err = parse_frames(&lines(&["NO DATA"]), "03220E01").unwrap_err();
        assert_eq!(err, CodecError::NotSupported);
    }

    #[test]
    fn adapter_errors_classify_as_malformed() {
        for reply in ["CAN ERROR", "BUFFER FULL", "?", "STOPPED"] {
            let err = parse_frames(&lines(&[reply]), "010D").unwrap_err();
            assert!(matches!(err, CodecError::Malformed(_)), "{reply}");
        }
    }

    #[test]
    fn echo_and_searching_lines_are_skipped() {
        let frames = parse_frames(
            &lines(&["010D", "SEARCHING...", "7E803410D32"]),
            "010D",
        )
        .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].can_id, 0x7E8);
        assert_eq!(frames[0].data, vec![0x03, 0x41, 0x0D, 0x32]);
    }

    #[test]
    fn garbage_line_is_malformed() {
        let err = parse_frames(&lines(&["7E8ZZ410D32"]), "010D").unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn speed_reply_decodes_to_raw_payload() {
        // 0x32 = 50 km/h in the mode 01 PID 0D reply
        let payload = parse_payload(&lines(&["7E803410D32"]), "010D").unwrap();
        assert_eq!(payload, vec![0x41, 0x0D, 0x32]);
    }
}
