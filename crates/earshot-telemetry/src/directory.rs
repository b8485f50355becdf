//! On-demand player lookups.

use earshot_cache::Lookup;
use tokio::time::Instant;
use tracing::debug;

use crate::parse::{self, ROSTER_COMMAND};
use crate::{GameChannel, Player, TelemetryError};

/// Looks players up directly on the game server.
///
/// Every call costs one or more console round trips, so front it with
/// [`earshot_cache::Cached`] when callers may ask repeatedly.
pub struct PlayerDirectory<C> {
    channel: C,
}

impl<C: GameChannel> PlayerDirectory<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Position and rotation for `username`, or `None` if they are not in
    /// the world.
    async fn fetch(&self, username: &str) -> Result<Option<Player>, TelemetryError> {
        let reply = self.channel.execute(&parse::position_command(username)).await?;
        let Some(position) = parse::parse_position(&reply)? else {
            return Ok(None);
        };
        let reply = self.channel.execute(&parse::rotation_command(username)).await?;
        let Some(orientation) = parse::parse_rotation(&reply)? else {
            return Ok(None);
        };
        Ok(Some(Player { username: username.to_owned(), position, orientation }))
    }
}

impl<C: GameChannel> Lookup for PlayerDirectory<C> {
    type Key = String;
    type Item = Player;
    type Error = TelemetryError;

    async fn get(&self, username: &String) -> Result<Player, TelemetryError> {
        let started = Instant::now();
        let result = self.fetch(username).await;
        debug!(
            player = %username,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "player lookup"
        );
        result?.ok_or_else(|| TelemetryError::NotFound(username.clone()))
    }

    async fn list(&self) -> Result<Vec<Player>, TelemetryError> {
        let started = Instant::now();
        let reply = self.channel.execute(ROSTER_COMMAND).await?;
        let roster = parse::parse_roster(&reply)?;

        let mut players = Vec::with_capacity(roster.len());
        for username in &roster {
            // Someone may log off between the roster and their own query.
            if let Some(player) = self.fetch(username).await? {
                players.push(player);
            }
        }
        debug!(
            players = players.len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "player list"
        );
        Ok(players)
    }
}
