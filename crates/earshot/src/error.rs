//! Unified error type for the Earshot relay.

use earshot_protocol::ProtocolError;
use earshot_session::SessionError;
use earshot_telemetry::TelemetryError;
use earshot_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically. Use
/// [`kind`](Self::kind) to decide what a boundary does with one.
#[derive(Debug, thiserror::Error)]
pub enum EarshotError {
    /// A transport-level error (accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (rejected claim, bad relay target).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The game channel failed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// A cached player lookup failed upstream.
    #[error("player lookup failed: {0}")]
    Lookup(TelemetryError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The relay could not start.
    #[error("startup failed: {0}")]
    Startup(String),
}

/// Broad classification of an [`EarshotError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket or game-channel failure; logged, the operation is abandoned.
    Transport,
    /// Malformed or misdirected message; logged, the connection stays open.
    Protocol,
    /// A rule refused the request; the client has been told.
    BusinessRule,
    /// A coalesced lookup failed; every waiter gets the same error.
    Cache,
    /// The process cannot continue.
    Fatal,
}

impl EarshotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EarshotError::Transport(_) | EarshotError::Telemetry(_) => ErrorKind::Transport,
            EarshotError::Protocol(_) => ErrorKind::Protocol,
            EarshotError::Session(SessionError::Rejected(_)) => ErrorKind::BusinessRule,
            EarshotError::Session(_) => ErrorKind::Protocol,
            EarshotError::Lookup(_) => ErrorKind::Cache,
            EarshotError::Config(_) | EarshotError::Startup(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the process should stop.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}
