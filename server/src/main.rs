use clap::Parser;
use log::info;
use server::http::StateServer;
use server::network::Server;
use shared::world::WorldLayout;
use shared::{LinkConditioner, SNAPSHOT_EVERY_N_TICKS, TICK_RATE};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// UDP port for the event stream
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// HTTP port serving /getState
    #[arg(long, default_value = "8081")]
    http_port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = TICK_RATE)]
    tick_rate: u32,

    /// Maximum concurrent sessions
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Broadcast a full snapshot every N ticks
    #[arg(long, default_value_t = SNAPSHOT_EVERY_N_TICKS)]
    snapshot_every: u32,

    /// World layout JSON; the built-in two-zone world is used otherwise
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

    let args = Args::parse();

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

    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64);
    let address = format!("{}:{}", args.host, args.port);

    let mut server = Server::new(&address, tick_duration, args.max_clients)
        .await?
        .with_layout(layout)
        .with_snapshot_every(args.snapshot_every)
        .with_link(link);

    let mut state_server = StateServer::new(format!("{}:{}", args.host, args.http_port));
    state_server.start(server.shared_state())?;

    info!(
        "Running at {}Hz, snapshot every {} ticks",
        args.tick_rate, args.snapshot_every
    );
    server.run().await?;

    Ok(())
}
