use clap::Parser;
use log::{error, info};
use server::network::Server;
use shared::config::GameConfig;
use shared::MAX_PLAYERS;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of players in the match
    #[arg(short, long, default_value_t = MAX_PLAYERS)]
    max_players: usize,

    /// JSON file overriding the default game tuning
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for spawn selection and bomb holder picks
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GameConfig::load(path).map_err(|e| {
            error!("Failed to load config {}: {}", path.display(), e);
            e
        })?,
        None => {
            let mut config = GameConfig::default();
            config.validate();
            config
        }
    };
    let seed = args.seed.unwrap_or_else(rand::random);
    let tick_rate = args.tick_rate.max(1);

    let address = format!("{}:{}", args.host, args.port);
    info!(
        "Starting server on {} at {}Hz, up to {} players (seed {})",
        address, tick_rate, args.max_players, seed
    );

    let mut server = Server::new(
        &address,
        Duration::from_secs_f64(1.0 / tick_rate as f64),
        args.max_players,
        config,
        seed,
    )
    .await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
