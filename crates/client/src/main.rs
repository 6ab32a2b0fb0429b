mod bot;
mod client;
mod config;
mod stats;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use bot::BotPattern;
use client::GameClient;
use config::ClientConfig;
use netsync::net::PacketLossSimulation;

#[derive(Parser)]
#[command(name = "netsync-client")]
#[command(about = "Headless replication client driven by a scripted bot")]
struct Args {
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:27015",
        help = "Server address to connect to"
    )]
    server: SocketAddr,

    #[arg(short, long, value_enum, default_value_t = BotPattern::Circle)]
    pattern: BotPattern,

    #[arg(short, long, default_value_t = netsync::DEFAULT_SIMULATION_RATE)]
    tick_rate: u32,

    #[arg(long, help = "Disconnect after this many seconds")]
    seconds: Option<u64>,

    #[arg(long, default_value_t = 10, help = "Seconds of silence before giving up")]
    timeout: u64,

    #[arg(long, default_value_t = 0.0, help = "Outbound packet loss percentage (0-100)")]
    loss_percent: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = ClientConfig {
        server_addr: args.server,
        connection_timeout: Duration::from_secs(args.timeout),
        packet_loss: (args.loss_percent > 0.0)
            .then(|| PacketLossSimulation::with_loss(args.loss_percent)),
        pattern: args.pattern,
        duration: args.seconds.map(Duration::from_secs),
        ..Default::default()
    };
    config.session.simulation_rate = args.tick_rate;

    let mut client = GameClient::connect(config)?;
    client.run()
}
