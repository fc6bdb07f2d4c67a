//! Error types for the signalling probe.
//!
//! Transport and protocol failures surface here. The verifier converts every
//! one of them into a terminal [`ConnectionOutcome`](crate::ConnectionOutcome),
//! so callers of [`Verifier::verify`](crate::Verifier::verify) never see them.

use thiserror::Error;

/// Result type alias for probe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while probing a signalling endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Endpoint URI could not be parsed.
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Endpoint URI uses a scheme other than `ws`.
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Role attributes in the endpoint path are missing or malformed.
    #[error("Invalid role attributes: {0}")]
    InvalidRoleAttributes(String),

    /// I/O error occurred (refused, reset, DNS failure).
    #[error("{0}")]
    Io(String),

    /// Server rejected or botched the opening handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake response exceeds the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Invalid UTF-8 in text frame.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Connection has been closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// Registry or runtime configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload serialization failed.
    #[error("Serialization error: {0}")]
    Serialize(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialize(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_message() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let err: Error = io_err.into();
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn test_error_display() {
        let err = Error::HandshakeTooLarge {
            size: 9000,
            max: 8192,
        };
        assert_eq!(err.to_string(), "Handshake too large: 9000 bytes (max: 8192)");
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let err: Error = toml::from_str::<toml::Value>("connection = [").unwrap_err().into();
        assert!(matches!(err, Error::Config(_)));
    }
}
