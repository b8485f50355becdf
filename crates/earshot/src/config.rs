//! Relay configuration.

use std::time::Duration;

use tracing::warn;

/// Everything the relay needs to start.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to. Default: `0.0.0.0:8080`.
    pub bind_addr: String,
    /// Game server RCON endpoint. Default: `localhost:25575`.
    pub rcon_addr: String,
    /// Default: `minecraft`.
    pub rcon_password: String,
    /// Time between telemetry cycles. Default: 500ms.
    pub poll_interval: Duration,
    /// Bound on each RCON command, including connect and auth. Default: 5s.
    pub command_timeout: Duration,
    /// Bound on each write to a client socket. Default: 5s.
    pub write_timeout: Duration,
    /// Telemetry events buffered per subscriber. Default: 256.
    pub event_capacity: usize,
    /// Verbose logging for the relay's own crates. Default: false.
    pub debug: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            rcon_addr: "localhost:25575".to_string(),
            rcon_password: "minecraft".to_string(),
            poll_interval: Duration::from_millis(500),
            command_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            event_capacity: 256,
            debug: false,
        }
    }
}

impl RelayConfig {
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
    pub const MIN_WRITE_TIMEOUT: Duration = Duration::from_millis(10);

    /// Clamps out-of-range values, logging each adjustment.
    pub fn validated(mut self) -> Self {
        if self.poll_interval < Self::MIN_POLL_INTERVAL {
            warn!(
                requested_ms = self.poll_interval.as_millis() as u64,
                "poll_interval below 10ms; clamping"
            );
            self.poll_interval = Self::MIN_POLL_INTERVAL;
        }
        if self.write_timeout < Self::MIN_WRITE_TIMEOUT {
            warn!(
                requested_ms = self.write_timeout.as_millis() as u64,
                "write_timeout below 10ms; clamping"
            );
            self.write_timeout = Self::MIN_WRITE_TIMEOUT;
        }
        if self.event_capacity == 0 {
            warn!("event_capacity must be at least 1; using 1");
            self.event_capacity = 1;
        }
        self
    }
}
