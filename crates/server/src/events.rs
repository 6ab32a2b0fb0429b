use netsync::PeerId;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    PeerJoined { peer: PeerId, slot: usize },
    PeerLeft { peer: PeerId, slot: usize },
    MatchStarted,
    MatchEnded,
    Error { message: String },
}

impl ServerEvent {
    pub fn log(&self) {
        match self {
            ServerEvent::PeerJoined { peer, slot } => {
                log::info!("{} joined as player {}", peer, slot);
            }
            ServerEvent::PeerLeft { peer, slot } => {
                log::info!("{} left player slot {}", peer, slot);
            }
            ServerEvent::MatchStarted => log::info!("Match started"),
            ServerEvent::MatchEnded => log::info!("Match ended"),
            ServerEvent::Error { message } => log::error!("{}", message),
        }
    }
}
