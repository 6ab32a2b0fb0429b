mod config;
mod events;
mod server;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use config::ServerConfig;
use netsync::net::PacketLossSimulation;
use netsync::{MAX_PLAYERS, ReplicationConfig, SessionConfig};
use server::GameServer;

#[derive(Parser)]
#[command(name = "netsync-server")]
#[command(about = "Authoritative snapshot replication server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = netsync::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = netsync::DEFAULT_SIMULATION_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = netsync::DEFAULT_SNAPSHOT_RATE)]
    snapshot_rate: u32,

    #[arg(long, default_value_t = 5, help = "Delta passes between full snapshot passes")]
    full_frame_interval: i32,

    #[arg(short, long, default_value_t = MAX_PLAYERS - 1)]
    max_clients: usize,

    #[arg(long, default_value_t = 10, help = "Seconds of silence before a peer is dropped")]
    timeout: u64,

    #[arg(long, default_value_t = 4, help = "Number of moving props to replicate")]
    props: usize,

    #[arg(long, help = "End the match this many seconds after the first player joins")]
    match_seconds: Option<u64>,

    #[arg(long, default_value_t = 0.0, help = "Outbound packet loss percentage (0-100)")]
    loss_percent: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let packet_loss = (args.loss_percent > 0.0)
        .then(|| PacketLossSimulation::with_loss(args.loss_percent));

    let config = ServerConfig {
        session: SessionConfig {
            replication: ReplicationConfig {
                full_frame_interval: args.full_frame_interval,
                snapshot_rate: args.snapshot_rate,
                ..Default::default()
            },
            simulation_rate: args.tick_rate,
            ..Default::default()
        },
        max_clients: args.max_clients,
        timeout: Duration::from_secs(args.timeout),
        packet_loss,
        match_duration: args.match_seconds.map(Duration::from_secs),
        props: args.props,
        ..Default::default()
    };

    let mut server = GameServer::new(&bind_addr, config)?;
    log::info!("Server started on {}", server.local_addr());
    server.run();
    log::info!("Server shutting down");

    Ok(())
}
