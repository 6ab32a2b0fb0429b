use glam::{Quat, Vec3};

use crate::player::{MovementConfig, PlayerInputs};
use crate::world::{Entity, EntityKind, World};

pub fn apply_inputs(entity: &mut Entity, inputs: &PlayerInputs, config: &MovementConfig, dt: f32) {
    let direction = inputs.wish_direction().normalize_or_zero();
    let speed = config.speed(inputs.sprint, inputs.crouch);

    entity.velocity = direction * speed;
    entity.transform.position += entity.velocity * dt;
    entity.transform.orientation = Quat::from_rotation_y(inputs.camera_yaw);
}

/// Advances every player by one step using the inputs received since the
/// previous step. Inputs are consumed; a player without new inputs stops.
pub fn step_players(world: &mut World, config: &MovementConfig, dt: f32) {
    for entity in world.entities_mut() {
        if entity.kind != EntityKind::Player {
            continue;
        }
        match entity.pending_input.take() {
            Some(inputs) => apply_inputs(entity, &inputs, config, dt),
            None => entity.velocity = Vec3::ZERO,
        }
    }
    world.advance_tick();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::MovementButton;
    use crate::world::EntityStore;

    fn forward_inputs(forward_axis: Vec3, right_axis: Vec3) -> PlayerInputs {
        let mut inputs = PlayerInputs {
            forward_axis,
            right_axis,
            ..Default::default()
        };
        inputs.set_pressed(MovementButton::Forward, true);
        inputs
    }

    #[test]
    fn test_forward_input_moves_along_forward_axis_next_step() {
        let mut world = World::new();
        let config = MovementConfig::default();
        let id = world.spawn_player(1, Vec3::ZERO);
        world.set_input(id, forward_inputs(Vec3::X, Vec3::Z));

        assert_eq!(world.transform(id).unwrap().position, Vec3::ZERO);

        step_players(&mut world, &config, 0.5);
        let position = world.transform(id).unwrap().position;
        assert!((position - Vec3::X * 2.0).length() < 1e-5);
        assert!(world.get_entity(id).unwrap().pending_input.is_none());

        step_players(&mut world, &config, 0.5);
        assert_eq!(world.transform(id).unwrap().position, position);
        assert_eq!(world.tick(), 2);
    }

    #[test]
    fn test_sprint_and_crouch_speeds() {
        let config = MovementConfig::default();
        let mut entity = Entity::new_player(0, Vec3::ZERO);

        let mut inputs = forward_inputs(Vec3::X, Vec3::Z);
        inputs.sprint = true;
        apply_inputs(&mut entity, &inputs, &config, 1.0);
        assert!((entity.velocity.length() - 5.0).abs() < 1e-5);

        inputs.crouch = true;
        apply_inputs(&mut entity, &inputs, &config, 1.0);
        assert!((entity.velocity.length() - 3.5).abs() < 1e-5);
    }

    #[test]
    fn test_diagonal_is_not_faster() {
        let config = MovementConfig::default();
        let mut entity = Entity::new_player(0, Vec3::ZERO);
        let mut inputs = forward_inputs(Vec3::ZERO, Vec3::ZERO);
        inputs.set_pressed(MovementButton::Right, true);

        apply_inputs(&mut entity, &inputs, &config, 1.0);
        assert!((entity.velocity.length() - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_orientation_follows_yaw() {
        let config = MovementConfig::default();
        let mut entity = Entity::new_player(0, Vec3::ZERO);
        let inputs = PlayerInputs {
            camera_yaw: 1.0,
            ..Default::default()
        };

        apply_inputs(&mut entity, &inputs, &config, 1.0 / 60.0);
        assert!(entity.orientation().abs_diff_eq(Quat::from_rotation_y(1.0), 1e-6));
        assert_eq!(entity.position(), Vec3::ZERO);
    }
}
