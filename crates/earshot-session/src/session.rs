//! Per-connection session records.

use std::sync::Arc;

use earshot_protocol::PeerId;

/// Where a session is in its lifecycle.
///
/// ```text
///   Unclaimed ──(connect)──→ Claimed ──(disconnect)──→ removed
///       └──────────────(disconnect)──────────────────→ removed
/// ```
///
/// A closed session is simply absent from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, but not yet speaking for any player.
    Unclaimed,
    /// Bound to this in-game player.
    Claimed { player: String },
}

impl SessionState {
    pub fn player(&self) -> Option<&str> {
        match self {
            SessionState::Unclaimed => None,
            SessionState::Claimed { player } => Some(player),
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, SessionState::Claimed { .. })
    }
}

/// One registered connection.
pub(crate) struct Session<C> {
    pub(crate) peer: PeerId,
    pub(crate) state: SessionState,
    pub(crate) conn: Arc<C>,
}

impl<C> Session<C> {
    pub(crate) fn new(peer: PeerId, conn: Arc<C>) -> Self {
        Self { peer, state: SessionState::Unclaimed, conn }
    }
}
