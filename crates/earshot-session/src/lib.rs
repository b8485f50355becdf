//! Session registry and signaling engine for Earshot.
//!
//! This crate binds transport connections to in-game players and brokers
//! voice-chat negotiation between them:
//!
//! 1. **Claiming**: a connection says which player it is; the registry
//!    checks the roster and makes sure nobody else holds that player.
//! 2. **Introductions**: every newly claimed session is paired with every
//!    existing one via reciprocal `join` messages.
//! 3. **Relaying**: opaque `set_ice`/`set_session` payloads are forwarded
//!    to the peer named in `subject`, with `subject` rewritten to the
//!    sender.
//! 4. **Volume**: when telemetry reports a move, listeners are told how
//!    loud the mover should be ([`proximity_volume`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Server / connection handler (above)  ← feeds messages and telemetry events in
//!     ↕
//! Session Layer (this crate)  ← owns the session and claim tables
//!     ↕
//! Protocol + Transport (below)  ← Command codec, Connection::send/close
//! ```

mod error;
mod registry;
mod session;
mod volume;

pub use error::{Rejection, SessionError};
pub use registry::{DEFAULT_WRITE_TIMEOUT, Registry};
pub use session::SessionState;
pub use volume::{VOLUME_CUTOFF, VOLUME_SCALE, proximity_volume};
