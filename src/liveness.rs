//! The liveness message sent once per successful handshake.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// `{"type":"ping","time":<ms since epoch>}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "time")]
    pub timestamp: i64,
}

impl LivenessMessage {
    pub const KIND: &'static str = "ping";

    #[must_use]
    pub fn at(timestamp: i64) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            timestamp,
        }
    }

    /// Stamped with the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::at(now_millis())
    }

    /// JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialize` if encoding fails.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
