//! Wire format encoding and decoding.
//!
//! Implements the 8-byte header format:
//! ```text
//! ┌──────────┬──────────┐
//! │ Opcode   │ Length   │
//! │ 4 bytes  │ 4 bytes  │
//! │ uint32 LE│ uint32 LE│
//! └──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Little Endian. The header is followed by
//! `length` bytes of UTF-8 JSON.

use crate::error::{PresenceError, Result};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload size (64 KiB).
///
/// The host never sends frames anywhere near this size; anything larger
/// means the stream is out of sync.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

/// Opcode constants for the protocol.
pub mod opcode {
    /// Handshake request (client) and handshake rejection (host).
    pub const HANDSHAKE: u32 = 0;
    /// Command, command response, or the `READY` dispatch.
    pub const FRAME: u32 = 1;
    /// Unsolicited dispatch, never a command response.
    pub const DISPATCH: u32 = 2;

    /// Check if an opcode may carry a command response.
    #[inline]
    pub fn is_command_response(op: u32) -> bool {
        op != DISPATCH
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame opcode (see `opcode` module).
    pub opcode: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(opcode: u32, payload_length: u32) -> Self {
        Self {
            opcode,
            payload_length,
        }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use presence_client::protocol::{opcode, Header};
    ///
    /// let bytes = Header::new(opcode::FRAME, 100).encode();
    /// assert_eq!(bytes, [1, 0, 0, 0, 100, 0, 0, 0]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.opcode.to_le_bytes());
        buf[4..8].copy_from_slice(&self.payload_length.to_le_bytes());
        buf
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            opcode: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            payload_length: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    /// Validate the payload length against a maximum.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.payload_length > max_payload_size {
            return Err(PresenceError::read_invalid_data(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }
        Ok(())
    }
}
