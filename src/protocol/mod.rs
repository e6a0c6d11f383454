//! Protocol module - wire format, framing, and message types.
//!
//! This module implements the frame layer:
//! - 8-byte little-endian header encoding/decoding
//! - Transport-driven frame reads (with peek) and writes
//! - Message struct with nonce extraction and success classification

mod frame;
mod wire_format;

pub use frame::{build_frame, read_message, write_message, Frame, Message, ERROR_MARKER};
pub use wire_format::{opcode, Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
