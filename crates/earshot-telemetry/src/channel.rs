//! The game-console abstraction the poller is written against.

use std::future::Future;
use std::sync::Arc;

use crate::TelemetryError;

/// A request/reply text channel to the game server's console.
///
/// Implementations serialise their own commands; callers may share one
/// channel between tasks. The poller takes two so that position queries
/// never queue behind the roster query.
pub trait GameChannel: Send + Sync + 'static {
    /// Runs one console command and returns its reply text.
    fn execute(
        &self,
        command: &str,
    ) -> impl Future<Output = Result<String, TelemetryError>> + Send;
}

impl<C: GameChannel> GameChannel for Arc<C> {
    fn execute(
        &self,
        command: &str,
    ) -> impl Future<Output = Result<String, TelemetryError>> + Send {
        (**self).execute(command)
    }
}
