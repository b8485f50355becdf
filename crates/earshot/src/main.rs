use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use earshot::{EarshotServer, RelayConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Proximity voice-chat signaling relay", long_about = None)]
struct Args {
    /// Address to accept WebSocket clients on
    #[arg(long, env = "EARSHOT_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Game server RCON endpoint
    #[arg(long, env = "RCON_ADDRESS", default_value = "localhost:25575")]
    rcon_address: String,

    /// Game server RCON password
    #[arg(long, env = "RCON_PASSWORD", default_value = "minecraft", hide_env_values = true)]
    rcon_password: String,

    /// Milliseconds between telemetry cycles
    #[arg(long, env = "EARSHOT_POLL_INTERVAL_MS", default_value_t = 500)]
    poll_interval_ms: u64,

    /// Upper bound on each RCON command, in milliseconds
    #[arg(long, env = "EARSHOT_COMMAND_TIMEOUT_MS", default_value_t = 5000)]
    command_timeout_ms: u64,

    /// Upper bound on each write to a client, in milliseconds
    #[arg(long, env = "EARSHOT_WRITE_TIMEOUT_MS", default_value_t = 5000)]
    write_timeout_ms: u64,

    /// Enable debug logging
    #[arg(short, long, env = "EARSHOT_DEBUG")]
    debug: bool,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        RelayConfig {
            bind_addr: self.bind,
            rcon_addr: self.rcon_address,
            rcon_password: self.rcon_password,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            debug: self.debug,
            ..RelayConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Args::parse().into_config();
    earshot::init_logging(config.debug);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("earshot-server: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: RelayConfig) -> Result<()> {
    info!(bind = %config.bind_addr, rcon = %config.rcon_addr, "starting Earshot relay");

    let server = EarshotServer::builder().config(config).build().await?;
    info!(addr = %server.local_addr()?, "relay bound");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("relay stopped");
    Ok(())
}
