use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::net::VersionId;
use crate::world::Transform;

/// One versioned sample of an entity's transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedState {
    pub version_id: VersionId,
    pub position: Vec3,
    pub orientation: Quat,
}

impl ReplicatedState {
    pub fn new(version_id: VersionId, transform: Transform) -> Self {
        Self {
            version_id,
            position: transform.position,
            orientation: transform.orientation,
        }
    }

    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.orientation)
    }
}
