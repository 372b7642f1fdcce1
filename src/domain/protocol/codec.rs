//! Central frame codec.
//!
//! Every inbound frame passes through [`decode`] before any component sees
//! it, so handlers only ever deal with well-formed [`SyncMessage`] values.

use serde_json::Value;
use thiserror::Error;

use super::messages::{Envelope, SyncMessage, MESSAGE_KINDS};

/// Frame-level protocol violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not JSON, or fields missing or mistyped for the declared kind.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The `type` field names no known message kind.
    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Serialize a message as a JSON text frame.
pub fn encode(message: &SyncMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decode a JSON text frame into a message.
///
/// # Errors
///
/// - `UnknownKind` if the frame's `type` is not a known kind
/// - `Malformed` for anything else that fails to parse
pub fn decode(frame: &str) -> Result<SyncMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    decode_value(value)
}

/// Decode an already-parsed JSON value into a message.
pub fn decode_value(value: Value) -> Result<SyncMessage, ProtocolError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing message type".to_string()))?;

    if !MESSAGE_KINDS.contains(&kind) {
        return Err(ProtocolError::UnknownKind(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Encode a relay envelope.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, ProtocolError> {
    serde_json::to_string(envelope).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decode a relay envelope, validating the inner message like [`decode`].
pub fn decode_envelope(frame: &str) -> Result<Envelope, ProtocolError> {
    let mut value: Value =
        serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let to = value
        .get("to")
        .cloned()
        .ok_or_else(|| ProtocolError::Malformed("missing recipient".to_string()))?;
    let to = serde_json::from_value(to).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let message = value
        .get_mut("message")
        .map(Value::take)
        .ok_or_else(|| ProtocolError::Malformed("missing message".to_string()))?;

    Ok(Envelope {
        to,
        message: decode_value(message)?,
    })
}
