//! Error types for presence-client.

use thiserror::Error;

/// Main error type for all presence operations.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// The channel to the host is not open.
    #[error("Pipe is not open")]
    ChannelNotOpen,

    /// No endpoint could be opened.
    #[error("Failed to open pipe: {0}")]
    OpenFailed(#[source] std::io::Error),

    /// Reading from the pipe failed or returned fewer bytes than requested.
    #[error("Failed to read from pipe: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// Writing to the pipe failed or was incomplete.
    #[error("Failed to write to pipe: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// A peeking read found nothing to read yet.
    #[error("Reading from pipe returned no data")]
    NoDataYet,

    /// The host answered the handshake with an unexpected opcode.
    #[error("Handshake failed: host replied with opcode {opcode}")]
    HandshakeFailed { opcode: u32 },

    /// The host rejected a command. Carries the raw response payload.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An activity field was out of bounds.
    #[error("Invalid activity: {0}")]
    InvalidActivity(String),

    /// Anything else.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl PresenceError {
    /// `true` for the soft "nothing to read yet" outcome of a peek.
    #[inline]
    pub fn is_no_data(&self) -> bool {
        matches!(self, PresenceError::NoDataYet)
    }

    /// `true` if the channel can no longer be trusted and must be closed.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            PresenceError::ChannelNotOpen
                | PresenceError::ReadFailed(_)
                | PresenceError::WriteFailed(_)
        )
    }

    pub(crate) fn read_invalid_data(msg: impl Into<String>) -> Self {
        PresenceError::ReadFailed(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            msg.into(),
        ))
    }
}

/// Result type alias using PresenceError.
pub type Result<T> = std::result::Result<T, PresenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failure_classification() {
        assert!(PresenceError::ChannelNotOpen.is_transport_failure());
        assert!(PresenceError::ReadFailed(std::io::ErrorKind::BrokenPipe.into())
            .is_transport_failure());
        assert!(!PresenceError::NoDataYet.is_transport_failure());
        assert!(!PresenceError::HandshakeFailed { opcode: 0 }.is_transport_failure());
        assert!(PresenceError::NoDataYet.is_no_data());
    }

    #[test]
    fn test_display_messages() {
        let err = PresenceError::HandshakeFailed { opcode: 2 };
        assert!(err.to_string().contains("opcode 2"));

        let err = PresenceError::read_invalid_data("bad utf-8");
        assert!(err.to_string().contains("bad utf-8"));
    }
}
