use crate::net::DEFAULT_SIMULATION_RATE;
use crate::player::MovementConfig;
use crate::replication::ReplicationConfig;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub replication: ReplicationConfig,
    pub movement: MovementConfig,
    /// Fixed simulation steps per second; clients send one input per step.
    pub simulation_rate: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            replication: ReplicationConfig::default(),
            movement: MovementConfig::default(),
            simulation_rate: DEFAULT_SIMULATION_RATE,
        }
    }
}
