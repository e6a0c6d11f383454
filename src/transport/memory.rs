//! In-memory transport for tests and simulations.
//!
//! [`MemoryTransport`] is handed to the engine; the paired [`MemoryPeer`]
//! plays the host: it queues inbound frames, injects failures and inspects
//! everything the engine wrote. With [`MemoryPeer::stall_reads`] a short
//! read stays pending, like a host that stopped mid-frame.
//!
//! # Example
//!
//! ```
//! use presence_client::transport::MemoryTransport;
//! use presence_client::protocol::opcode;
//!
//! let (transport, peer) = MemoryTransport::new();
//! peer.push_frame(opcode::FRAME, r#"{"evt":"READY"}"#);
//! assert!(peer.written_frames().is_empty());
//! # drop(transport);
//! ```

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::Transport;
use crate::error::{PresenceError, Result};
use crate::protocol::{build_frame, Frame, Header, HEADER_SIZE};

#[derive(Default)]
struct State {
    open: bool,
    opens: usize,
    fail_open: bool,
    fail_writes: usize,
    fail_next_read: bool,
    stall_reads: bool,
    inbound: BytesMut,
    written: Vec<u8>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Split captured bytes into complete frames. A trailing partial frame is
/// left out.
fn split_frames(mut bytes: &[u8]) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Some(header) = Header::decode(bytes) {
        let end = HEADER_SIZE + header.payload_length as usize;
        if bytes.len() < end {
            break;
        }
        let payload = Bytes::copy_from_slice(&bytes[HEADER_SIZE..end]);
        frames.push(Frame::new(header, payload));
        bytes = &bytes[end..];
    }
    frames
}

/// Engine side of the in-memory channel.
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

/// Host side of the in-memory channel.
#[derive(Clone)]
pub struct MemoryPeer {
    state: Arc<Mutex<State>>,
}

impl MemoryTransport {
    /// Create a closed transport and its peer.
    pub fn new() -> (Self, MemoryPeer) {
        let state = Arc::new(Mutex::new(State::default()));
        (
            Self {
                state: state.clone(),
            },
            MemoryPeer { state },
        )
    }
}

impl MemoryPeer {
    /// Queue a frame for the engine to read.
    pub fn push_frame(&self, opcode: u32, payload: &str) {
        match build_frame(opcode, payload.as_bytes()) {
            Ok(bytes) => self.push_bytes(&bytes),
            Err(e) => tracing::warn!(opcode, error = %e, "Dropping unframeable payload"),
        }
    }

    /// Queue raw bytes for the engine to read.
    pub fn push_bytes(&self, bytes: &[u8]) {
        lock(&self.state).inbound.extend_from_slice(bytes);
    }

    /// Make every `open` fail until reset.
    pub fn set_open_failure(&self, fail: bool) {
        lock(&self.state).fail_open = fail;
    }

    /// Fail the next `count` writes.
    pub fn fail_next_writes(&self, count: usize) {
        lock(&self.state).fail_writes = count;
    }

    /// Fail the next read with a broken pipe.
    pub fn fail_next_read(&self) {
        lock(&self.state).fail_next_read = true;
    }

    /// Leave reads that cannot be satisfied pending instead of failing them
    /// with an EOF. A peek with nothing buffered still reports no data.
    pub fn stall_reads(&self, stall: bool) {
        lock(&self.state).stall_reads = stall;
    }

    /// Whether the engine currently holds the channel open.
    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        lock(&self.state).opens
    }

    /// All frames the engine has written, in order.
    pub fn written_frames(&self) -> Vec<Frame> {
        split_frames(&lock(&self.state).written)
    }

    /// Forget everything written so far.
    pub fn clear_written(&self) {
        lock(&self.state).written.clear();
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.open {
            return Ok(());
        }
        if state.fail_open {
            return Err(PresenceError::OpenFailed(io::Error::new(
                io::ErrorKind::NotFound,
                "memory endpoint unavailable",
            )));
        }
        state.open = true;
        state.opens += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.open {
            // A fresh connection never sees the old connection's leftovers.
            state.inbound.clear();
        }
        state.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    async fn read(&mut self, len: usize, peek: bool) -> Result<Bytes> {
        {
            let mut state = lock(&self.state);
            if !state.open {
                return Err(PresenceError::ChannelNotOpen);
            }
            if state.fail_next_read {
                state.fail_next_read = false;
                return Err(PresenceError::ReadFailed(io::ErrorKind::BrokenPipe.into()));
            }
            if peek && state.inbound.is_empty() {
                return Err(PresenceError::NoDataYet);
            }
            if state.inbound.len() >= len {
                return Ok(state.inbound.split_to(len).freeze());
            }
            if !state.stall_reads {
                return Err(PresenceError::ReadFailed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, got {}", len, state.inbound.len()),
                )));
            }
        }

        // Only a timeout or dropping the future gets the caller out.
        std::future::pending::<Result<Bytes>>().await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(PresenceError::ChannelNotOpen);
        }
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(PresenceError::WriteFailed(io::ErrorKind::BrokenPipe.into()));
        }
        state.written.extend_from_slice(data);
        Ok(())
    }

    fn cancel_pending_io(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{opcode, read_message, DEFAULT_MAX_PAYLOAD_SIZE};

    #[tokio::test]
    async fn test_open_close_idempotent() {
        let (mut transport, peer) = MemoryTransport::new();

        transport.open().await.unwrap();
        transport.open().await.unwrap();
        assert_eq!(peer.open_count(), 1);
        assert!(peer.is_open());

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_peek_without_data() {
        let (mut transport, _peer) = MemoryTransport::new();
        transport.open().await.unwrap();

        assert!(matches!(
            transport.read(8, true).await,
            Err(PresenceError::NoDataYet)
        ));
        assert!(matches!(
            transport.read(8, false).await,
            Err(PresenceError::ReadFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (mut transport, peer) = MemoryTransport::new();
        transport.open().await.unwrap();

        peer.push_frame(opcode::FRAME, r#"{"nonce":"abc"}"#);
        let msg = read_message(&mut transport, true, DEFAULT_MAX_PAYLOAD_SIZE)
            .await
            .unwrap();
        assert_eq!(msg.nonce.as_deref(), Some("abc"));

        transport
            .write(&build_frame(opcode::HANDSHAKE, b"{}").unwrap())
            .await
            .unwrap();
        let frames = peer.written_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode(), opcode::HANDSHAKE);
    }

    #[test]
    fn test_split_frames_keeps_complete_frames_only() {
        let mut bytes = build_frame(opcode::HANDSHAKE, b"first").unwrap();
        bytes.extend(build_frame(opcode::FRAME, b"").unwrap());
        bytes.extend(build_frame(opcode::DISPATCH, b"third").unwrap());
        bytes.extend_from_slice(&Header::new(opcode::FRAME, 10).encode());
        bytes.extend_from_slice(b"tr");

        let frames = split_frames(&bytes);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload(), b"first");
        assert!(frames[1].payload().is_empty());
        assert_eq!(frames[2].opcode(), opcode::DISPATCH);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_read_stays_pending() {
        let (mut transport, peer) = MemoryTransport::new();
        transport.open().await.unwrap();
        peer.stall_reads(true);
        peer.push_bytes(b"abc");

        let read = transport.read(8, false);
        let outcome = tokio::time::timeout(std::time::Duration::from_secs(30), read).await;
        assert!(outcome.is_err());
        assert!(matches!(
            transport.read(3, true).await,
            Ok(bytes) if bytes.as_ref() == b"abc"
        ));
        assert!(matches!(
            transport.read(8, true).await,
            Err(PresenceError::NoDataYet)
        ));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let (mut transport, peer) = MemoryTransport::new();

        peer.set_open_failure(true);
        assert!(matches!(
            transport.open().await,
            Err(PresenceError::OpenFailed(_))
        ));
        peer.set_open_failure(false);
        transport.open().await.unwrap();

        peer.fail_next_writes(1);
        assert!(transport.write(b"a").await.is_err());
        assert!(transport.write(b"b").await.is_ok());

        peer.fail_next_read();
        assert!(matches!(
            transport.read(8, true).await,
            Err(PresenceError::ReadFailed(_))
        ));
    }
}
