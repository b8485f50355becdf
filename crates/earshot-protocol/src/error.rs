//! Error types for the protocol layer.

use crate::Op;

/// Errors that can occur while encoding or decoding signaling messages.
///
/// None of these are shown to the client. The registry logs them and
/// keeps the connection open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing `op`, or any of
    /// the command-level errors below surfaced through serde.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The `op` field named an operation this relay does not know.
    #[error("unknown op: {0:?}")]
    UnknownOp(String),

    /// A `subject` that is not exactly 24 hex digits.
    #[error("invalid peer id: {0:?}")]
    InvalidPeerId(String),

    /// The payload does not have the shape its op requires.
    #[error("invalid {op} payload: {reason}")]
    InvalidPayload { op: Op, reason: String },
}
