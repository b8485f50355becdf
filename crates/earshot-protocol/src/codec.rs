//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The registry never calls `serde_json` directly; it goes through a
//! [`Codec`], so the wire format is decided in one place.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the codec lives inside the registry,
/// which is shared across every connection's handler task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected type. Command-level validation failures
    /// (unknown op, bad subject, wrong payload shape) also surface here.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`). Signaling clients are
/// browsers, so this is the only codec the relay speaks.
///
/// ## Example
///
/// ```rust
/// use earshot_protocol::{Codec, Command, JsonCodec, PeerId};
///
/// let codec = JsonCodec;
/// let peer = PeerId::generate();
///
/// let bytes = codec.encode(&Command::part(peer)).unwrap();
/// let decoded: Command = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, Command::part(peer));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
