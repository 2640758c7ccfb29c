use clap::Parser;
use log::{error, info};
use peer::config::PeerConfig;
use peer::handoff::HostHandoff;
use peer::network::TokenRing;
use peer::reconcile::ReconciliationEngine;
use peer::simulation::{run_simulation_loop, Autopilot};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address this peer listens on
    #[arg(short = 'b', long, default_value = "127.0.0.1:7000")]
    bind: SocketAddr,

    /// Address of the next peer in the ring
    #[arg(short = 'n', long, default_value = "127.0.0.1:7001")]
    next: SocketAddr,

    /// Player controlled by this peer
    #[arg(short = 'p', long, default_value = "1")]
    player_id: u32,

    /// Every player in the ring, comma separated
    #[arg(long, value_delimiter = ',', default_value = "1,2")]
    players: Vec<u32>,

    /// Creatures spawned for each player
    #[arg(long, default_value = "3")]
    creatures_per_player: u32,

    /// Text map file, the built-in map is used when omitted
    #[arg(short = 'm', long)]
    map: Option<PathBuf>,

    /// Simulation ticks per second
    #[arg(short = 't', long, default_value_t = shared::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Milliseconds to hold the token before passing it on
    #[arg(long, default_value = "10")]
    hold_ms: u64,

    /// Milliseconds without a token before the ring is considered broken
    #[arg(long, default_value = "2000")]
    token_timeout_ms: u64,

    /// Ticks of history kept in the token, 0 keeps everything
    #[arg(long, default_value = "600")]
    history_window: u64,

    /// Inject the first token into the ring
    #[arg(short = 'i', long)]
    initiator: bool,

    /// Issue random move orders for this player's creatures
    #[arg(short = 'a', long)]
    autopilot: bool,

    /// Seed for the autopilot
    #[arg(long, default_value = "0")]
    seed: u64,
}

impl From<Args> for PeerConfig {
    fn from(args: Args) -> Self {
        PeerConfig {
            bind: args.bind,
            next: args.next,
            player_id: args.player_id,
            players: args.players,
            creatures_per_player: args.creatures_per_player,
            map: args.map,
            tick_rate: args.tick_rate,
            hold: Duration::from_millis(args.hold_ms),
            token_timeout: Duration::from_millis(args.token_timeout_ms),
            history_window: args.history_window,
            initiator: args.initiator,
            autopilot: args.autopilot,
            seed: args.seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = PeerConfig::from(Args::parse()).validate()?;

    let grid = config.load_grid()?;
    info!(
        "Loaded {}x{} map, players {:?}",
        grid.width(),
        grid.height(),
        config.players
    );
    let world = Arc::new(RwLock::new(config.build_world(grid)?));

    let handoff = HostHandoff::new(
        Arc::clone(&world),
        ReconciliationEngine::default(),
        config.history_window,
    );
    let mut ring = TokenRing::bind(&config, handoff).await?;

    let autopilot = config
        .autopilot
        .then(|| Autopilot::new(config.seed ^ u64::from(config.player_id), 40));
    let simulation = tokio::spawn(run_simulation_loop(
        Arc::clone(&world),
        config.tick_rate,
        autopilot,
    ));

    tokio::select! {
        result = ring.run() => {
            if let Err(e) = result {
                error!("Token ring stopped: {}", e);
            }
        }
        result = simulation => {
            if let Err(e) = result {
                error!("Simulation task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    if let Err(e) = ring.leave().await {
        error!("Failed to announce leaving: {}", e);
    }

    Ok(())
}
