//! Configuration, timeouts and limits for probe runs.

use std::time::Duration;

/// Default handshake timeout in milliseconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5000;

/// Default linger time between sending the liveness message and closing.
pub const DEFAULT_LINGER_MS: u64 = 2000;

/// Default time to wait for the peer's close frame after closing locally.
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 30_000;

/// Resource limits applied to the server side of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single inbound frame in bytes.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of the handshake response in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024, // 16 MB
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Validate that frame size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_frame_size {
            Err(crate::Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`](crate::Error::HandshakeTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_handshake_size {
            Err(crate::Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Timers driving a single verification.
///
/// Only one of them is live at any lifecycle phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Upper bound on time spent connecting (TCP + opening handshake).
    ///
    /// Default: 5 seconds
    pub handshake: Duration,

    /// Time to keep an open connection before closing it locally.
    ///
    /// Default: 2 seconds
    pub linger: Duration,

    /// Time to wait for the peer's close frame before terminating.
    ///
    /// Default: 30 seconds
    pub close: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            linger: Duration::from_millis(DEFAULT_LINGER_MS),
            close: Duration::from_millis(DEFAULT_CLOSE_TIMEOUT_MS),
        }
    }
}

impl Timeouts {
    /// Create new timeouts with custom values.
    #[must_use]
    pub const fn new(handshake: Duration, linger: Duration, close: Duration) -> Self {
        Self {
            handshake,
            linger,
            close,
        }
    }
}

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Timer configuration.
    pub timeouts: Timeouts,

    /// Resource limits.
    pub limits: Limits,

    /// Read buffer size (in bytes).
    ///
    /// Default: 8 KB (8192)
    pub read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            limits: Limits::default(),
            read_buffer_size: 8192,
        }
    }
}

impl Config {
    /// Create a new configuration with default timeouts and limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout configuration.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.handshake = timeout;
        self
    }

    /// Set the linger time.
    #[must_use]
    pub const fn with_linger(mut self, linger: Duration) -> Self {
        self.timeouts.linger = linger;
        self
    }

    /// Set the close timeout.
    #[must_use]
    pub const fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.close = timeout;
        self
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }
}
