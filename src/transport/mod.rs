//! Transport module - the duplex byte channel to the host.
//!
//! The engine only talks to the [`Transport`] trait. Provided
//! implementations:
//! - [`PipeTransport`] - Unix Domain Socket (Linux/macOS) or Named Pipe (Windows)
//! - [`MemoryTransport`] - in-memory double driven by a [`MemoryPeer`]

mod memory;
mod pipe;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use memory::{MemoryPeer, MemoryTransport};
pub use pipe::{candidate_paths, PipeTransport, DEFAULT_WRITE_TIMEOUT, MAX_PIPE_INDEX};

/// Duplex byte channel to the presence host.
///
/// All operations are driven from a single task; implementations need no
/// internal locking against concurrent calls.
#[async_trait]
pub trait Transport: Send {
    /// Open the channel. Opening an open channel is a no-op.
    async fn open(&mut self) -> Result<()>;

    /// Close the channel. Closing a closed channel is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Whether the channel is currently open.
    fn is_open(&self) -> bool;

    /// Read exactly `len` bytes.
    ///
    /// With `peek`, returns [`PresenceError::NoDataYet`](crate::PresenceError::NoDataYet)
    /// without consuming or blocking when nothing is available.
    async fn read(&mut self, len: usize, peek: bool) -> Result<Bytes>;

    /// Write all of `data` or fail.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Discard any partially read data after an abandoned read.
    ///
    /// Dropping an in-flight read future cancels the I/O itself; this makes
    /// sure the next read starts on a frame boundary.
    fn cancel_pending_io(&mut self);
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn open(&mut self) -> Result<()> {
        (**self).open().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    async fn read(&mut self, len: usize, peek: bool) -> Result<Bytes> {
        (**self).read(len, peek).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data).await
    }

    fn cancel_pending_io(&mut self) {
        (**self).cancel_pending_io()
    }
}
