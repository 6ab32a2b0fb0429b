pub mod net;
pub mod player;
pub mod replication;
pub mod session;
pub mod simulation;
pub mod world;

pub use net::{
    DEFAULT_PORT, DEFAULT_SIMULATION_RATE, DEFAULT_SNAPSHOT_RATE, Dispatcher, EntityId,
    LoopbackNetwork, MAX_PLAYERS, Message, MessageHandler, MessageTag, PacketLossSimulation,
    PeerId, Transport, TransportError, TransportEvent, UdpClientTransport, UdpServerTransport,
    VersionId, WireError,
};
pub use player::{MovementButton, MovementConfig, PlayerInputs};
pub use replication::{
    AckTable, EntityReplica, ReplicaDiagnostics, ReplicatedState, ReplicationConfig, Replicator,
    SnapshotScheduler,
};
pub use session::{ClientSession, Roster, ServerSession, SessionConfig};
pub use simulation::{FixedTimestep, Simulation};
pub use world::{Entity, EntityKind, EntityStore, Transform, World};
