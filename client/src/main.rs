use clap::Parser;
use client::app::App;
use client::network::NetworkHandle;
use log::{error, info};
use macroquad::window::Conf;
use shared::config::GameConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: usize,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Bomb Party".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let app = match App::new(&GameConfig::default(), args.width, args.height, args.fake_ping) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to create client: {}", e);
            return;
        }
    };
    let network = match NetworkHandle::spawn(&args.server, args.fake_ping) {
        Ok(network) => network,
        Err(e) => {
            error!("Failed to start network: {}", e);
            return;
        }
    };

    app.run(network).await;
}
