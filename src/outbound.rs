//! Outbound command queue.
//!
//! Commands are encoded when the engine absorbs them and wait here until
//! the next drain pass writes them to the transport in FIFO order.
//!
//! # Architecture
//!
//! ```text
//! ClientHandle ─┐
//! ClientHandle ─┼─► command channel ─► engine loop ─► OutboundQueue ─► Transport
//! Client ───────┘                          │
//!                                          └─► PendingCalls (nonce → callback)
//! ```
//!
//! A failed write only fails the callback of that entry; the pass carries
//! on with the next one.

use std::collections::{HashSet, VecDeque};

use bytes::Bytes;

use crate::pending::PendingCalls;
use crate::protocol::write_message;
use crate::transport::Transport;

/// An encoded command ready to be written.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub opcode: u32,
    /// Complete JSON payload.
    pub payload: Bytes,
    /// Nonce embedded in the payload; keys the pending callback.
    pub nonce: String,
}

impl OutboundMessage {
    #[inline]
    pub fn new(opcode: u32, payload: impl Into<Bytes>, nonce: String) -> Self {
        Self {
            opcode,
            payload: payload.into(),
            nonce,
        }
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries written successfully.
    pub written: usize,
    /// Entries whose write failed.
    pub failed: usize,
    /// At least one failure means the channel is unusable.
    pub connection_lost: bool,
}

/// FIFO of commands waiting to be written.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    queue: VecDeque<OutboundMessage>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the back of the queue.
    pub fn push(&mut self, message: OutboundMessage) {
        self.queue.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Nonces of every queued entry.
    pub fn nonces(&self) -> HashSet<String> {
        self.queue.iter().map(|m| m.nonce.clone()).collect()
    }

    /// Drop every queued entry, returning their nonces.
    pub fn clear(&mut self) -> Vec<String> {
        self.queue.drain(..).map(|m| m.nonce).collect()
    }

    /// Write every queued entry in order.
    ///
    /// A failed write invokes that entry's pending callback with the error
    /// and the pass continues.
    pub async fn drain<T>(&mut self, transport: &mut T, pending: &mut PendingCalls) -> DrainReport
    where
        T: Transport + ?Sized,
    {
        let mut report = DrainReport::default();

        while let Some(message) = self.queue.pop_front() {
            match write_message(transport, message.opcode, &message.payload).await {
                Ok(()) => {
                    tracing::debug!(
                        opcode = message.opcode,
                        nonce = %message.nonce,
                        "Sent command"
                    );
                    report.written += 1;
                }
                Err(e) => {
                    tracing::error!(
                        opcode = message.opcode,
                        nonce = %message.nonce,
                        error = %e,
                        "Failed to send command"
                    );
                    report.failed += 1;
                    report.connection_lost |= e.is_transport_failure();
                    if let Some(callback) = pending.take(&message.nonce) {
                        callback(Err(e));
                    }
                }
            }
        }

        report
    }
}
