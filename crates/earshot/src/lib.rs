//! # Earshot
//!
//! Signaling relay for proximity voice chat on a Minecraft-style game
//! server.
//!
//! Clients connect over WebSocket, claim the in-game player they speak
//! for, and exchange opaque WebRTC negotiation payloads through the relay.
//! The relay polls the game's RCON console for the roster and positions,
//! and tells every listener how loud each nearby speaker should be.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use earshot::prelude::*;
//!
//! # async fn run() -> Result<(), EarshotError> {
//! earshot::init_logging(false);
//! let server = EarshotServer::builder()
//!     .config(RelayConfig::default())
//!     .build()
//!     .await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod logging;
mod server;

pub use config::RelayConfig;
pub use error::{EarshotError, ErrorKind};
pub use handler::MAX_MESSAGE_BYTES;
pub use logging::init_logging;
pub use server::{EarshotServer, EarshotServerBuilder, RelayRegistry};

/// Convenient re-exports for building and embedding a relay.
pub mod prelude {
    pub use earshot_cache::{CacheConfig, Cached, Lookup};
    pub use earshot_protocol::{Codec, Command, JsonCodec, Op, Payload, PeerId};
    pub use earshot_session::{Registry, Rejection, SessionError, SessionState, proximity_volume};
    pub use earshot_telemetry::{
        GameChannel, Orientation, Player, PlayerDirectory, Poller, PollerConfig, Position, RconChannel,
        TelemetryError, TelemetryEvent, WorldView,
    };
    pub use earshot_transport::{Connection, Transport, TransportError};

    pub use crate::{EarshotError, EarshotServer, EarshotServerBuilder, ErrorKind, RelayConfig};
}
