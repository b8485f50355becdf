//! `EarshotServer` builder and server loop.
//!
//! This is the entry point for running the relay. It ties together all the
//! layers: transport → protocol → session, with telemetry feeding the
//! session registry from the side.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use earshot_session::Registry;
use earshot_telemetry::{EventStream, GameChannel, Poller, PollerConfig, RconChannel};
use earshot_transport::{Transport, WebSocketConnection, WebSocketTransport};
use tracing::{debug, error, info};

use crate::handler::handle_connection;
use crate::{EarshotError, RelayConfig};

/// The registry as the server runs it: WebSocket sessions checked against
/// the poller's view of the world.
pub type RelayRegistry<C> = Registry<WebSocketConnection, Poller<C>>;

/// Builder for configuring and starting an Earshot relay.
///
/// # Example
///
/// ```rust,ignore
/// use earshot::prelude::*;
///
/// let server = EarshotServer::builder()
///     .config(RelayConfig::default())
///     .bind("127.0.0.1:9000")
///     .build()
///     .await?;
/// server.run_until(tokio::signal::ctrl_c()).await
/// ```
pub struct EarshotServerBuilder {
    config: RelayConfig,
}

impl EarshotServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self { config: RelayConfig::default() }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the WebSocket listener to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Dials the game server twice (roster and positions), then builds
    /// the relay on top.
    pub async fn build(self) -> Result<EarshotServer<RconChannel>, EarshotError> {
        let config = self.config.validated();
        let roster = dial(&config).await?;
        let position = dial(&config).await?;
        Self { config }.build_with_channels(roster, position).await
    }

    /// Builds the relay on game channels the caller already holds.
    pub async fn build_with_channels<C: GameChannel>(
        self,
        roster: C,
        position: C,
    ) -> Result<EarshotServer<C>, EarshotError> {
        let config = self.config.validated();

        let transport = WebSocketTransport::bind(&config.bind_addr)
            .await
            .map_err(|e| EarshotError::Startup(format!("failed to bind {}: {e}", config.bind_addr)))?;

        let poller = Poller::new(
            roster,
            position,
            PollerConfig { event_capacity: config.event_capacity },
        );
        let registry =
            Arc::new(Registry::new(poller.clone()).with_write_timeout(config.write_timeout));

        Ok(EarshotServer { transport, registry, poller, config })
    }
}

impl Default for EarshotServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn dial(config: &RelayConfig) -> Result<RconChannel, EarshotError> {
    RconChannel::connect(&config.rcon_addr, &config.rcon_password, config.command_timeout)
        .await
        .map_err(|e| {
            EarshotError::Startup(format!("RCON connection to {} failed: {e}", config.rcon_addr))
        })
}

/// A bound Earshot relay.
///
/// Call [`run_until()`](Self::run_until) to start polling and accepting
/// connections.
pub struct EarshotServer<C: GameChannel> {
    transport: WebSocketTransport,
    registry: Arc<RelayRegistry<C>>,
    poller: Poller<C>,
    config: RelayConfig,
}

impl EarshotServer<RconChannel> {
    /// Creates a new builder.
    pub fn builder() -> EarshotServerBuilder {
        EarshotServerBuilder::new()
    }
}

impl<C: GameChannel> EarshotServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, EarshotError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn registry(&self) -> &Arc<RelayRegistry<C>> {
        &self.registry
    }

    pub fn poller(&self) -> &Poller<C> {
        &self.poller
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), EarshotError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Starts the poller and the event pump, then accepts connections
    /// until `shutdown` resolves.
    ///
    /// On shutdown the poller is stopped and its in-flight cycle awaited.
    /// Connections already accepted keep their handler tasks.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), EarshotError>
    where
        F: Future,
    {
        let poller = self.poller.start(self.config.poll_interval)?;
        let pump = tokio::spawn(pump_events(self.poller.events(), Arc::clone(&self.registry)));

        info!(addr = ?self.transport.local_addr().ok(), "Earshot relay listening");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let registry = Arc::clone(&self.registry);
                        tokio::spawn(handle_connection(conn, registry));
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },
            }
        }

        info!("shutting down");
        poller.stop();
        poller.join().await;
        pump.abort();
        Ok(())
    }
}

/// Forwards telemetry events into the registry, one at a time.
async fn pump_events<C: GameChannel>(mut events: EventStream, registry: Arc<RelayRegistry<C>>) {
    while let Some(event) = events.next().await {
        registry.handle_event(event).await;
    }
    debug!("telemetry event pump finished");
}
