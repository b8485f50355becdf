//! Game-server telemetry for Earshot.
//!
//! Keeps a live view of which players are online and where they stand by
//! issuing console commands to the game server on a fixed cadence:
//!
//! - [`GameChannel`]: one command in, one text reply out. [`RconChannel`]
//!   speaks the Source RCON protocol over TCP.
//! - [`parse`]: turns `list` and `data get entity` replies into values.
//! - [`CycleScheduler`]: paces polling cycles and tracks their timing.
//! - [`Poller`]: runs the cycles, holds the latest [`Snapshot`], and
//!   publishes [`TelemetryEvent`]s when players join, leave, or move.
//! - [`PlayerDirectory`]: on-demand player lookups, meant to sit behind
//!   [`earshot_cache::Cached`].
//!
//! # Integration
//!
//! ```ignore
//! let roster = RconChannel::connect(addr, password, timeout).await?;
//! let position = RconChannel::connect(addr, password, timeout).await?;
//! let poller = Poller::new(roster, position, PollerConfig::default());
//!
//! let mut events = poller.events();
//! let handle = poller.start(Duration::from_millis(500))?;
//! while let Some(event) = events.next().await {
//!     // react to joins, leaves, and moves
//! }
//! ```

mod channel;
mod directory;
mod error;
pub mod parse;
mod poller;
mod rcon;
mod schedule;
mod types;

pub use channel::GameChannel;
pub use directory::PlayerDirectory;
pub use error::TelemetryError;
pub use poller::{EventStream, Poller, PollerConfig, PollerHandle, WorldView};
pub use rcon::RconChannel;
pub use schedule::{CycleInfo, CycleMetrics, CycleScheduler};
pub use types::{Orientation, Player, Position, Snapshot, TelemetryEvent};
