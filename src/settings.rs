//! Engine configuration.

use std::time::Duration;

use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;

/// Reconnect automatically when the channel is closed.
pub const DEFAULT_AUTO_RECONNECT: bool = true;

/// Wait after a failed reconnect attempt.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Wait between loop iterations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound for the handshake reply.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for the rest of an inbound frame once it has started arriving.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Configuration for the protocol engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Reconnect from the loop when the channel is closed.
    pub auto_reconnect: bool,
    /// Wait after a failed reconnect attempt.
    pub reconnect_interval: Duration,
    /// Wait between loop iterations.
    pub poll_interval: Duration,
    /// Upper bound for the handshake reply.
    pub handshake_timeout: Duration,
    /// Upper bound for finishing a frame the peek has seen. A host that
    /// stalls mid-frame past it is treated as a read failure.
    pub read_timeout: Duration,
    /// Inbound frames with a larger payload are treated as a read failure.
    pub max_payload_size: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            auto_reconnect: DEFAULT_AUTO_RECONNECT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}
