//! Dials the game server's RCON console and prints every online player's
//! position and facing, once per interval, through the lookup cache.
//!
//! Several readers asking at once share one round trip; run with
//! `--readers 4 --debug` to watch the upstream calls collapse.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use earshot::prelude::*;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Game server RCON endpoint
    #[arg(long, env = "RCON_ADDRESS", default_value = "localhost:25575")]
    rcon_address: String,

    /// Game server RCON password
    #[arg(long, env = "RCON_PASSWORD", default_value = "minecraft", hide_env_values = true)]
    rcon_password: String,

    /// Milliseconds between reads
    #[arg(short, long, default_value_t = 1000)]
    interval_ms: u64,

    /// Cache max age in milliseconds
    #[arg(long, default_value_t = 100)]
    max_age_ms: u64,

    /// Concurrent readers per interval
    #[arg(short, long, default_value_t = 1)]
    readers: usize,

    /// Look up only this player instead of listing everyone
    #[arg(short, long)]
    player: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

type Directory = Cached<PlayerDirectory<RconChannel>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    earshot::init_logging(args.debug);

    let channel =
        RconChannel::connect(&args.rcon_address, &args.rcon_password, Duration::from_secs(5))
            .await?;
    info!(addr = %args.rcon_address, "connected to game server");

    let directory: Arc<Directory> = Arc::new(Cached::new(
        PlayerDirectory::new(channel),
        CacheConfig { max_age: Duration::from_millis(args.max_age_ms) },
    ));

    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms.max(10)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        let mut reads = Vec::with_capacity(args.readers.max(1));
        for _ in 0..args.readers.max(1) {
            let directory = Arc::clone(&directory);
            let player = args.player.clone();
            reads.push(tokio::spawn(async move {
                match player {
                    Some(name) => directory.get(&name).await.map(|p| vec![p]),
                    None => directory.list().await,
                }
            }));
        }

        // Every reader sees the same answer; print the first.
        let mut printed = false;
        for read in reads {
            match read.await {
                Ok(Ok(players)) if !printed => {
                    print_players(&players);
                    printed = true;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!(error = %EarshotError::Lookup(e), "read failed");
                }
                Err(e) => warn!(error = %e, "reader task failed"),
            }
        }
    }

    info!("stopped");
    Ok(())
}

fn print_players(players: &[Player]) {
    if players.is_empty() {
        println!("(nobody online)");
        return;
    }
    for player in players {
        println!(
            "{:<16} {}  yaw {:>7.1}  pitch {:>6.1}",
            player.username, player.position, player.orientation.yaw, player.orientation.pitch
        );
    }
    println!();
}
