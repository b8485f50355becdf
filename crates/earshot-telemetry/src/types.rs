//! Values observed from the game world.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A point in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Where a player is looking, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub yaw: f64,
    pub pitch: f64,
}

/// Everything the directory knows about one online player.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub username: String,
    pub position: Position,
    pub orientation: Orientation,
}

/// A change observed between two polling cycles.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Joined(String),
    Left(String),
    Moved { player: String, position: Position },
}

impl TelemetryEvent {
    /// The player this event is about.
    pub fn player(&self) -> &str {
        match self {
            TelemetryEvent::Joined(p) | TelemetryEvent::Left(p) => p,
            TelemetryEvent::Moved { player, .. } => player,
        }
    }
}

/// The world as of one completed polling cycle.
///
/// A player can be on the roster without a position: the position query
/// came back empty, which means "unknown", never the origin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// The cycle that produced this snapshot. `0` before the first one.
    pub cycle: u64,
    pub roster: BTreeSet<String>,
    pub positions: HashMap<String, Position>,
}
