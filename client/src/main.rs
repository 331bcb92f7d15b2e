use clap::Parser;
use client::input::InputManager;
use client::network::Client;
use log::info;
use shared::world::WorldLayout;
use shared::LinkConditioner;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server UDP address
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Server HTTP address serving /getState
    #[arg(long, default_value = "127.0.0.1:8081")]
    http: String,

    /// Looping movement script, e.g. "right:30,none:10,left:30"
    #[arg(short, long, default_value = "right:60,down:60,left:60,up:60")]
    pattern: String,

    /// Fire every N frames (0 disables)
    #[arg(short, long, default_value = "0")]
    fire_every: u32,

    /// Stop after this many seconds; run until killed otherwise
    #[arg(short, long)]
    duration: Option<u64>,

    /// World layout JSON the server runs; prediction walls come from it
    #[arg(short, long)]
    world: Option<PathBuf>,

    /// Simulate a bad link on outbound traffic
    #[arg(long)]
    simulate_lag: bool,

    /// Packet loss probability when simulating
    #[arg(long, default_value = "0.1")]
    loss: f64,

    /// Minimum added latency in milliseconds when simulating
    #[arg(long, default_value = "100")]
    latency_min: u64,

    /// Maximum added latency in milliseconds when simulating
    #[arg(long, default_value = "150")]
    latency_max: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let input = InputManager::from_pattern(&args.pattern, args.fire_every)?;
    let layout = match &args.world {
        Some(path) => {
            info!("Loading world from {}", path.display());
            WorldLayout::load(path)?
        }
        None => WorldLayout::builtin(),
    };
    let link = if args.simulate_lag {
        info!(
            "Simulating {:.0}% loss and {}-{}ms latency",
            args.loss * 100.0,
            args.latency_min,
            args.latency_max
        );
        LinkConditioner::new(args.loss, args.latency_min, args.latency_max)
    } else {
        LinkConditioner::disabled()
    };

    info!("Connecting to {} (state from {})", args.server, args.http);
    let mut client = Client::new(&args.server, &args.http, input)
        .await?
        .with_link(link)
        .with_layout(layout);

    client.run(args.duration.map(Duration::from_secs)).await?;

    Ok(())
}
