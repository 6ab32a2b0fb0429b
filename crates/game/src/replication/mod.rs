mod acks;
mod replica;
mod replicator;
mod scheduler;
mod state;

pub use acks::AckTable;
pub use replica::{
    EntityReplica, ReplicaDiagnostics, Snapshot, dequantize_orientation, dequantize_position,
    quantize_orientation, quantize_position,
};
pub use replicator::{OutboundSnapshot, Recipients, Replicator, SyncChanges};
pub use scheduler::{PassKind, ReplicationConfig, SnapshotScheduler};
pub use state::ReplicatedState;
