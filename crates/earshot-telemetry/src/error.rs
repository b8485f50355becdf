//! Error types for the telemetry layer.

use std::sync::Arc;
use std::time::Duration;

/// Errors that can occur while talking to the game server.
///
/// `Clone` so a single failed lookup can be handed to every caller
/// coalesced onto it by the request cache. I/O errors are not `Clone`,
/// hence the `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TelemetryError {
    /// The underlying socket failed.
    #[error("game channel I/O failed: {0}")]
    Io(Arc<std::io::Error>),

    /// The server refused the RCON password.
    #[error("RCON authentication rejected")]
    AuthRejected,

    /// No reply within the configured bound.
    #[error("game command timed out after {0:?}")]
    Timeout(Duration),

    /// A reply did not have the expected shape.
    #[error("unparseable reply: {0}")]
    Parse(String),

    /// The player is not in the world.
    #[error("no such player: {0}")]
    NotFound(String),

    /// An RCON packet exceeded the size limit.
    #[error("RCON packet too large: {0} bytes")]
    PacketTooLarge(usize),

    /// [`Poller::start`](crate::Poller::start) was called while the
    /// poller was already running.
    #[error("poller is already running")]
    AlreadyRunning,
}

impl From<std::io::Error> for TelemetryError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}
