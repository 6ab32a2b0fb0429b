use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::net::EntityId;
use crate::player::PlayerInputs;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntityKind {
    Player = 0,
    Prop = 1,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub transform: Transform,
    pub velocity: Vec3,
    pub pending_input: Option<PlayerInputs>,
}

impl Entity {
    pub fn new(id: EntityId, kind: EntityKind) -> Self {
        Self {
            id,
            kind,
            transform: Transform::default(),
            velocity: Vec3::ZERO,
            pending_input: None,
        }
    }

    pub fn new_player(id: EntityId, spawn_position: Vec3) -> Self {
        Self {
            transform: Transform::from_position(spawn_position),
            ..Self::new(id, EntityKind::Player)
        }
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    pub fn orientation(&self) -> Quat {
        self.transform.orientation
    }
}
