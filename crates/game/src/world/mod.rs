mod entity;
#[allow(clippy::module_inception)]
mod world;

pub use entity::{Entity, EntityKind, Transform};
pub use world::{EntityStore, FIRST_DYNAMIC_ENTITY_ID, World};
