use std::net::SocketAddr;
use std::time::Duration;

use netsync::net::PacketLossSimulation;
use netsync::{DEFAULT_PORT, SessionConfig};

use crate::bot::BotPattern;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    pub session: SessionConfig,
    pub connection_timeout: Duration,
    pub packet_loss: Option<PacketLossSimulation>,
    pub pattern: BotPattern,
    /// Stop after this long; None runs until the server ends the match.
    pub duration: Option<Duration>,
    pub status_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            session: SessionConfig::default(),
            connection_timeout: Duration::from_secs(10),
            packet_loss: None,
            pattern: BotPattern::Circle,
            duration: None,
            status_interval: Duration::from_secs(2),
        }
    }
}
