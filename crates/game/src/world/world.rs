use std::collections::BTreeMap;

use glam::Vec3;

use super::entity::{Entity, EntityKind, Transform};
use crate::net::{EntityId, MAX_PLAYERS};
use crate::player::PlayerInputs;

/// Ids below this are reserved for player slots.
pub const FIRST_DYNAMIC_ENTITY_ID: EntityId = 10;

/// What the replication layer needs from the simulation it mirrors.
pub trait EntityStore {
    fn transform(&self, id: EntityId) -> Option<Transform>;

    fn set_transform(&mut self, id: EntityId, transform: Transform) -> bool;

    /// Ids of every entity, in a stable ascending order.
    fn entity_ids(&self) -> Vec<EntityId>;

    /// Creates a placeholder entity for `id` if none exists.
    fn ensure_entity(&mut self, id: EntityId);

    fn remove_entity(&mut self, id: EntityId) -> bool;
}

#[derive(Debug)]
pub struct World {
    tick: u32,
    entities: BTreeMap<EntityId, Entity>,
    next_entity_id: EntityId,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            tick: 0,
            entities: BTreeMap::new(),
            next_entity_id: FIRST_DYNAMIC_ENTITY_ID,
        }
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn advance_tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    /// Player entities share their id with their roster slot.
    pub fn spawn_player(&mut self, slot: usize, spawn_position: Vec3) -> EntityId {
        debug_assert!(slot < MAX_PLAYERS);
        let id = slot as EntityId;
        self.entities
            .insert(id, Entity::new_player(id, spawn_position));
        id
    }

    pub fn spawn_prop(&mut self, transform: Transform) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;

        let mut entity = Entity::new(id, EntityKind::Prop);
        entity.transform = transform;
        self.entities.insert(id, entity);
        id
    }

    pub fn despawn_entity(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Stores inputs for the entity's next simulation step; newer inputs replace older ones.
    pub fn set_input(&mut self, id: EntityId, inputs: PlayerInputs) -> bool {
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.pending_input = Some(inputs);
                true
            }
            None => false,
        }
    }
}

impl EntityStore for World {
    fn transform(&self, id: EntityId) -> Option<Transform> {
        self.entities.get(&id).map(|entity| entity.transform)
    }

    fn set_transform(&mut self, id: EntityId, transform: Transform) -> bool {
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.transform = transform;
                true
            }
            None => false,
        }
    }

    fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    fn ensure_entity(&mut self, id: EntityId) {
        let kind = if (id as usize) < MAX_PLAYERS {
            EntityKind::Player
        } else {
            EntityKind::Prop
        };
        self.entities
            .entry(id)
            .or_insert_with(|| Entity::new(id, kind));
        if id >= self.next_entity_id {
            self.next_entity_id = id + 1;
        }
    }

    fn remove_entity(&mut self, id: EntityId) -> bool {
        self.entities.remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_ids_match_slots() {
        let mut world = World::new();

        assert_eq!(world.spawn_player(2, Vec3::ONE), 2);
        assert_eq!(world.spawn_prop(Transform::default()), FIRST_DYNAMIC_ENTITY_ID);
        assert_eq!(world.entity_ids(), vec![2, FIRST_DYNAMIC_ENTITY_ID]);
        assert_eq!(world.get_entity(2).unwrap().kind, EntityKind::Player);
    }

    #[test]
    fn test_ensure_entity_is_idempotent() {
        let mut world = World::new();
        world.ensure_entity(1);
        world.set_transform(1, Transform::from_position(Vec3::X));
        world.ensure_entity(1);

        assert_eq!(world.entity_count(), 1);
        assert_eq!(world.transform(1).unwrap().position, Vec3::X);
        assert_eq!(world.get_entity(1).unwrap().kind, EntityKind::Player);
    }

    #[test]
    fn test_ensure_entity_reserves_dynamic_ids() {
        let mut world = World::new();
        world.ensure_entity(12);

        assert_eq!(world.spawn_prop(Transform::default()), 13);
    }

    #[test]
    fn test_set_input_requires_entity() {
        let mut world = World::new();
        assert!(!world.set_input(0, PlayerInputs::default()));

        world.spawn_player(0, Vec3::ZERO);
        assert!(world.set_input(0, PlayerInputs::default()));
        assert!(world.get_entity(0).unwrap().pending_input.is_some());
    }
}
