//! Frame struct, message model and transport-driven frame I/O.
//!
//! A [`Frame`] is what the wire carries: header plus raw payload bytes.
//! A [`Message`] is a frame whose payload has been checked as UTF-8 and
//! whose correlation nonce (if any) has been pulled out.
//!
//! # Example
//!
//! ```
//! use presence_client::protocol::{build_frame, opcode, Header};
//!
//! let bytes = build_frame(opcode::FRAME, br#"{"nonce":"abc"}"#).unwrap();
//! let header = Header::decode(&bytes).unwrap();
//! assert_eq!(header.opcode, opcode::FRAME);
//! assert_eq!(header.payload_length, 15);
//! ```

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use serde::Deserialize;

use super::wire_format::{opcode, Header, HEADER_SIZE};
use crate::error::{PresenceError, Result};
use crate::transport::Transport;

/// Substring the host puts in a response payload when a command failed.
pub const ERROR_MARKER: &str = r#""evt":"ERROR""#;

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get the opcode.
    #[inline]
    pub fn opcode(&self) -> u32 {
        self.header.opcode
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Frame opcode.
    pub opcode: u32,
    /// UTF-8 JSON payload.
    pub payload: Bytes,
    /// Correlation nonce found in the payload, if any.
    pub nonce: Option<String>,
}

#[derive(Deserialize)]
struct NonceField<'a> {
    #[serde(borrow, default)]
    nonce: Option<Cow<'a, str>>,
}

impl Message {
    /// Build a message, validating UTF-8 and extracting the nonce.
    pub fn from_frame(frame: Frame) -> Result<Self> {
        let text = std::str::from_utf8(&frame.payload)
            .map_err(|e| PresenceError::read_invalid_data(format!("payload is not UTF-8: {e}")))?;
        let nonce = extract_nonce(text);

        Ok(Self {
            opcode: frame.header.opcode,
            payload: frame.payload,
            nonce,
        })
    }

    /// Payload as text. Always valid, checked on construction.
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or_default()
    }

    /// Whether the host reported success for this message.
    ///
    /// False if the payload carries the error marker or the message is a
    /// bare dispatch rather than a command response.
    pub fn is_success(&self) -> bool {
        opcode::is_command_response(self.opcode) && !self.text().contains(ERROR_MARKER)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Nonce:{} Op:{} Msg:{}",
            self.nonce.as_deref().unwrap_or("NONE"),
            self.opcode,
            self.text()
        )
    }
}

/// Pull the top-level `"nonce"` string out of a JSON object payload.
fn extract_nonce(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    serde_json::from_str::<NonceField<'_>>(text)
        .ok()
        .and_then(|f| f.nonce)
        .filter(|n| !n.is_empty())
        .map(Cow::into_owned)
}

/// Build a complete frame as a single byte vector.
///
/// # Errors
///
/// [`PresenceError::WriteFailed`] if the payload length does not fit the
/// 32-bit length field.
///
/// # Example
///
/// ```
/// use presence_client::protocol::{build_frame, HEADER_SIZE};
///
/// let bytes = build_frame(1, b"{}").unwrap();
/// assert_eq!(bytes.len(), HEADER_SIZE + 2);
/// ```
pub fn build_frame(opcode: u32, payload: &[u8]) -> Result<Vec<u8>> {
    let header = Header::new(opcode, frame_length(payload.len())?);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    Ok(buf)
}

fn frame_length(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        PresenceError::WriteFailed(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "payload does not fit in a frame",
        ))
    })
}

/// Write one frame through the transport in a single write.
pub async fn write_message<T>(transport: &mut T, opcode: u32, payload: &[u8]) -> Result<()>
where
    T: Transport + ?Sized,
{
    transport.write(&build_frame(opcode, payload)?).await
}

/// Read one frame from the transport.
///
/// With `peek`, returns [`PresenceError::NoDataYet`] instead of blocking when
/// no frame has started arriving. Once the header is consumed the payload is
/// always read to completion.
pub async fn read_message<T>(transport: &mut T, peek: bool, max_payload_size: u32) -> Result<Message>
where
    T: Transport + ?Sized,
{
    let raw = transport.read(HEADER_SIZE, peek).await?;
    let header = Header::decode(&raw)
        .ok_or_else(|| PresenceError::read_invalid_data("short frame header"))?;
    header.validate(max_payload_size)?;

    let payload = if header.payload_length == 0 {
        Bytes::new()
    } else {
        transport.read(header.payload_length as usize, false).await?
    };
    if payload.len() != header.payload_length as usize {
        return Err(PresenceError::read_invalid_data("short frame payload"));
    }

    Message::from_frame(Frame::new(header, payload))
}
