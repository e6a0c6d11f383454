//! Platform-specific pipe/socket implementation.
//!
//! - Unix: Unix Domain Socket `discord-ipc-N` in the runtime/temp directory
//! - Windows: Named Pipe `\\.\pipe\discord-ipc-N`
//!
//! # Example
//!
//! ```ignore
//! use presence_client::transport::{PipeTransport, Transport};
//!
//! let mut pipe = PipeTransport::new();
//! pipe.open().await?;
//! ```

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::Transport;
use crate::error::{PresenceError, Result};

/// Endpoints `discord-ipc-0` through `discord-ipc-9` are tried in order.
pub const MAX_PIPE_INDEX: u8 = 10;

/// Upper bound for a single frame write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Initial read buffer capacity.
const READ_CHUNK: usize = 4 * 1024;

/// Endpoint paths to try, in order.
#[cfg(unix)]
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .filter_map(std::env::var_os)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .collect();
    dirs.push(PathBuf::from("/tmp"));
    dirs.dedup();

    dirs.iter()
        .flat_map(|dir| (0..MAX_PIPE_INDEX).map(move |i| dir.join(format!("discord-ipc-{i}"))))
        .collect()
}

/// Endpoint paths to try, in order.
#[cfg(windows)]
pub fn candidate_paths() -> Vec<PathBuf> {
    (0..MAX_PIPE_INDEX)
        .map(|i| PathBuf::from(format!(r"\\.\pipe\discord-ipc-{i}")))
        .collect()
}

// ============================================================================
// Platform streams
// ============================================================================

#[cfg(unix)]
struct Stream(tokio::net::UnixStream);

#[cfg(unix)]
impl Stream {
    async fn connect(path: &PathBuf) -> io::Result<Self> {
        tokio::net::UnixStream::connect(path).await.map(Stream)
    }
}

#[cfg(windows)]
struct Stream(tokio::net::windows::named_pipe::NamedPipeClient);

#[cfg(windows)]
impl Stream {
    async fn connect(path: &PathBuf) -> io::Result<Self> {
        tokio::net::windows::named_pipe::ClientOptions::new()
            .open(path)
            .map(Stream)
    }
}

impl Stream {
    fn try_read_buf(&self, buf: &mut BytesMut) -> io::Result<usize> {
        self.0.try_read_buf(buf)
    }

    async fn read_buf(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        self.0.read_buf(buf).await
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.0.write_all(data).await?;
        self.0.flush().await
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Transport over the host's local IPC endpoint.
pub struct PipeTransport {
    stream: Option<Stream>,
    /// Bytes read from the stream but not yet handed out.
    buffer: BytesMut,
    path: Option<PathBuf>,
    write_timeout: Duration,
}

impl PipeTransport {
    /// Transport that tries the default endpoints in order on open.
    pub fn new() -> Self {
        Self {
            stream: None,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            path: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Transport bound to one explicit endpoint.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new()
        }
    }

    /// Set the upper bound for a single write.
    ///
    /// Default: 5 seconds
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    async fn connect_any(&self) -> io::Result<Stream> {
        let paths = match &self.path {
            Some(path) => vec![path.clone()],
            None => candidate_paths(),
        };

        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no IPC endpoint found");
        for path in &paths {
            match Stream::connect(path).await {
                Ok(stream) => {
                    tracing::debug!(path = %path.display(), "Connected to IPC endpoint");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::trace!(path = %path.display(), error = %e, "IPC endpoint unavailable");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

impl Default for PipeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for PipeTransport {
    async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = self.connect_any().await.map_err(PresenceError::OpenFailed)?;
        self.buffer.clear();
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.stream = None;
        self.buffer.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn read(&mut self, len: usize, peek: bool) -> Result<Bytes> {
        let stream = self.stream.as_mut().ok_or(PresenceError::ChannelNotOpen)?;

        if peek && self.buffer.is_empty() {
            self.buffer.reserve(READ_CHUNK);
            match stream.try_read_buf(&mut self.buffer) {
                Ok(0) => {
                    return Err(PresenceError::ReadFailed(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "host closed the pipe",
                    )))
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(PresenceError::NoDataYet)
                }
                Err(e) => return Err(PresenceError::ReadFailed(e)),
            }
        }

        while self.buffer.len() < len {
            self.buffer.reserve(len - self.buffer.len());
            let n = stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(PresenceError::ReadFailed)?;
            if n == 0 {
                return Err(PresenceError::ReadFailed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, got {}", len, self.buffer.len()),
                )));
            }
        }

        Ok(self.buffer.split_to(len).freeze())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(PresenceError::ChannelNotOpen)?;

        match tokio::time::timeout(self.write_timeout, stream.write_all(data)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PresenceError::WriteFailed(e)),
            Err(_) => Err(PresenceError::WriteFailed(io::Error::new(
                io::ErrorKind::TimedOut,
                "write timed out",
            ))),
        }
    }

    fn cancel_pending_io(&mut self) {
        self.buffer.clear();
    }
}
