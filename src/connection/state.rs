//! Client connection state machine (RFC 6455 Section 7).

use std::fmt;

/// Lifecycle state of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Opening handshake in progress.
    #[default]
    Connecting,
    /// Handshake accepted; messages may flow both ways.
    Open,
    /// We sent a close frame and are waiting for the peer's.
    Closing,
    /// Close handshake finished or the stream ended.
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    #[must_use]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }

    /// State after a local close frame went out.
    #[must_use]
    pub const fn on_close_sent(self) -> Self {
        match self {
            ConnectionState::Open => ConnectionState::Closing,
            other => other,
        }
    }

    /// State after the peer's close frame, or end of stream, arrived.
    #[must_use]
    pub const fn on_close_received(self) -> Self {
        ConnectionState::Closed
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
