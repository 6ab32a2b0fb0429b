mod connection;
mod dispatch;
mod endpoint;
mod frame;
mod protocol;
mod stats;
mod transport;

pub use connection::{AdmitError, Admission, ConnectionManager, ConnectionState, PeerConnection};
pub use dispatch::{Dispatcher, HandlerRef, MessageHandler, handler_ref};
pub use endpoint::{NetworkEndpoint, UdpClientTransport, UdpServerTransport};
pub use frame::{
    MAX_PACKET_SIZE, PROTOCOL_MAGIC, PROTOCOL_VERSION, Packet, PacketError, PacketHeader,
    PacketType, SequenceFilter, sequence_greater_than,
};
pub use protocol::{
    AckMessage, AppMessage, DEFAULT_PORT, DEFAULT_SIMULATION_RATE, DEFAULT_SNAPSHOT_RATE,
    DeltaMessage, DespawnMessage, EntityId, FullMessage, InputFlags, InputMessage, MAX_PLAYERS,
    Message, MessageTag, ORIENTATION_QUANT_SCALE, RosterMessage, VersionId, WireError, peek_tag,
};
pub use stats::{NetworkStats, PacketLossSimulation};
pub use transport::{
    LoopbackEndpoint, LoopbackNetwork, PeerId, Transport, TransportError, TransportEvent,
};
