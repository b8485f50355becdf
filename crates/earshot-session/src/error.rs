//! Error types for the session layer.

use std::fmt;

use earshot_protocol::{Op, PeerId, ProtocolError};

/// Why a `connect` was refused. The message is what the client sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The player is not on the current roster.
    NoSuchPlayer,
    /// Another session already holds the player.
    PlayerAlreadyClaimed,
    /// This session already holds a player.
    SessionAlreadyClaimed,
}

impl Rejection {
    pub fn message(self) -> &'static str {
        match self {
            Rejection::NoSuchPlayer => "No such in-game player.",
            Rejection::PlayerAlreadyClaimed => "Player session already claimed.",
            Rejection::SessionAlreadyClaimed => "Session has already claimed a player.",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Errors that can occur while handling a session's messages.
///
/// Only [`SessionError::Rejected`] is ever shown to the client; everything
/// else is logged and dropped.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A business rule refused the request. The client has already been
    /// sent the rejection message.
    #[error("claim rejected: {0}")]
    Rejected(Rejection),

    /// No session is registered under this id (already disconnected).
    #[error("unknown session {0}")]
    UnknownPeer(PeerId),

    /// A relay op arrived from a session that has not claimed a player.
    #[error("session {0} has not claimed a player")]
    NotClaimed(PeerId),

    /// A relay op without a `subject`.
    #[error("{0} without a subject")]
    MissingSubject(Op),

    /// The `subject` does not name a claimed session.
    #[error("no claimed session {0}")]
    UnknownSubject(PeerId),

    /// A client sent an op only the relay may send.
    #[error("clients may not send {0}")]
    ServerOnlyOp(Op),

    /// The message could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
