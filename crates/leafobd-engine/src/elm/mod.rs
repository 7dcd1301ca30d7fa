//! ELM327 wire protocol
//!
//! The adapter is a line-oriented serial device: commands are terminated by
//! `\r`, replies by a `>` prompt. With headers on and spaces off (`ATH1`,
//! `ATS0`) each data line is a 3-digit CAN id followed by the frame bytes in
//! hex; multi-frame replies arrive as ISO-TP segments that need reassembly.

mod codec;
mod isotp;

pub use codec::{encode_command, parse_frames, parse_payload, reply_is_ok, take_reply, CodecError};
pub use isotp::{reassemble, RawFrame};

/// Prompt byte the adapter sends when it is ready for the next command
pub const PROMPT: u8 = b'>';
