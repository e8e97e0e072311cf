//! The frame envelope.
//!
//! One frame per transport message, both directions. `data` is always a JSON
//! object; commands with no payload send `{}` or omit the field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// A single protocol frame: `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Event or command name, e.g. `"auth:login"` or `"voice:peer-join"`.
    pub event: String,
    /// Payload. Defaults to `null` when absent on the wire.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Frame {
    /// Build a frame from an event name and any serializable payload.
    ///
    /// Serialization of payload types defined in this crate cannot fail; a
    /// failure here indicates a non-string map key or similar programming
    /// error, so the payload degrades to `null` rather than panicking.
    pub fn new(event: &str, data: impl Serialize) -> Self {
        Self {
            event: event.to_string(),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    /// Build a payload-less frame.
    pub fn bare(event: &str) -> Self {
        Self {
            event: event.to_string(),
            data: Value::Null,
        }
    }

    /// Decode a frame from raw transport text.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let frame: Frame = serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed {
            reason: e.to_string(),
        })?;
        if frame.event.is_empty() {
            return Err(ProtocolError::Malformed {
                reason: "empty event name".to_string(),
            });
        }
        Ok(frame)
    }

    /// Encode for the wire.
    ///
    /// Infallible for frames built through this crate; see [`Frame::new`].
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{\"event\":\"error\"}"))
    }
}
