//! WebSocket messages and close codes as seen by the probe.

/// WebSocket close status code per RFC 6455 Section 7.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001).
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Payload inconsistent with the message type (1007).
    InvalidPayload,
    /// Policy violation (1008).
    PolicyViolation,
    /// Internal error (1011).
    InternalError,
    /// Any other code.
    Other(u16),
}

impl CloseCode {
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => *code,
        }
    }

    /// Whether `code` may appear in a close frame (RFC 6455 Section 7.4).
    ///
    /// 1005, 1006 and 1015 are reserved for local use; 1016..=2999 are
    /// unassigned.
    #[must_use]
    pub const fn is_allowed_on_wire(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

/// Close frame containing status code and optional reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseFrame {
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Decode a close frame payload. An empty payload carries no status.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [] => None,
            [hi, lo, reason @ ..] => Some(Self::new(
                CloseCode::from_u16(u16::from_be_bytes([*hi, *lo])),
                String::from_utf8_lossy(reason),
            )),
            [_] => Some(Self::new(CloseCode::ProtocolError, "Invalid close frame")),
        }
    }

    /// Status code to answer a peer's close frame with; `None` for an empty
    /// payload.
    ///
    /// A valid code is echoed without its reason. A malformed payload or a
    /// code not allowed on the wire gets 1002, a reason that is not UTF-8
    /// gets 1007.
    #[must_use]
    pub fn reply_code(payload: &[u8]) -> Option<CloseCode> {
        match payload {
            [] => None,
            [_] => Some(CloseCode::ProtocolError),
            [hi, lo, reason @ ..] => {
                let code = u16::from_be_bytes([*hi, *lo]);
                Some(if !CloseCode::is_allowed_on_wire(code) {
                    CloseCode::ProtocolError
                } else if std::str::from_utf8(reason).is_err() {
                    CloseCode::InvalidPayload
                } else {
                    CloseCode::from_u16(code)
                })
            }
        }
    }
}

/// Messages delivered by [`Connection::recv`](crate::Connection::recv).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    /// Ping from the peer; the pong has already been queued.
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// Peer's close frame, or the answer to ours.
    Close(Option<CloseFrame>),
}

impl Message {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    #[must_use]
    pub const fn is_close(&self) -> bool {
        matches!(self, Message::Close(_))
    }
}
