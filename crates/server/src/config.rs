use std::time::Duration;

use netsync::net::PacketLossSimulation;
use netsync::{MAX_PLAYERS, SessionConfig};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub session: SessionConfig,
    pub max_clients: usize,
    pub timeout: Duration,
    pub packet_loss: Option<PacketLossSimulation>,
    /// Length of a match once the first player joins; None runs forever.
    pub match_duration: Option<Duration>,
    pub props: usize,
    pub stats_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            max_clients: MAX_PLAYERS - 1,
            timeout: Duration::from_secs(10),
            packet_loss: None,
            match_duration: None,
            props: 4,
            stats_interval: Duration::from_secs(5),
        }
    }
}
