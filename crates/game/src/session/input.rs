use super::roster::Roster;
use crate::net::{EntityId, InputMessage, PeerId, VersionId};
use crate::player::PlayerInputs;
use crate::replication::AckTable;
use crate::world::World;

/// Builds the per-step input message, filling in camera axes when the
/// caller left them zero.
pub fn outgoing_input(
    player_slot: Option<usize>,
    inputs: PlayerInputs,
    last_accepted_version_id: VersionId,
) -> InputMessage {
    let inputs = if inputs.forward_axis == glam::Vec3::ZERO && inputs.right_axis == glam::Vec3::ZERO {
        inputs.with_camera_axes()
    } else {
        inputs
    };

    InputMessage {
        player_slot,
        inputs,
        last_accepted_version_id,
    }
}

/// Queues a peer's inputs on its player entity for the next simulation step.
///
/// The slot comes from the roster entry for `sender`; the slot the message
/// claims is ignored. Returns the slot the inputs were stored for.
pub fn accept_input(
    world: &mut World,
    roster: &Roster,
    acks: &mut AckTable,
    sender: PeerId,
    msg: &InputMessage,
) -> Option<usize> {
    acks.record_fallback(sender, msg.last_accepted_version_id);

    let Some(slot) = roster.slot_of(sender) else {
        log::debug!("Dropping input from unslotted {}", sender);
        return None;
    };
    if msg.player_slot.is_some_and(|claimed| claimed != slot) {
        log::debug!(
            "{} claimed slot {:?} but holds slot {}",
            sender,
            msg.player_slot,
            slot
        );
    }

    if world.set_input(slot as EntityId, msg.inputs) {
        Some(slot)
    } else {
        log::debug!("No player entity for slot {} yet", slot);
        None
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::player::MovementButton;

    fn input_from(slot: Option<usize>, version: VersionId) -> InputMessage {
        let mut inputs = PlayerInputs::default();
        inputs.set_pressed(MovementButton::Forward, true);
        outgoing_input(slot, inputs, version)
    }

    #[test]
    fn test_outgoing_input_fills_axes() {
        let msg = input_from(Some(1), 3);
        assert!((msg.inputs.forward_axis - Vec3::NEG_Z).length() < 1e-6);
        assert!((msg.inputs.right_axis - Vec3::X).length() < 1e-6);
        assert_eq!(msg.last_accepted_version_id, 3);
    }

    #[test]
    fn test_slot_resolved_from_sender() {
        let mut world = World::new();
        let mut acks = AckTable::new();
        let roster = Roster::rebuild(PeerId::LOCAL, &[PeerId(1), PeerId(2)]);
        world.spawn_player(1, Vec3::ZERO);
        world.spawn_player(2, Vec3::ZERO);

        let slot = accept_input(&mut world, &roster, &mut acks, PeerId(2), &input_from(Some(1), 7));

        assert_eq!(slot, Some(2));
        assert!(world.get_entity(2).unwrap().pending_input.is_some());
        assert!(world.get_entity(1).unwrap().pending_input.is_none());
        assert_eq!(acks.acked_version(40, PeerId(2)), Some(7));
    }

    #[test]
    fn test_unslotted_sender_is_dropped() {
        let mut world = World::new();
        let mut acks = AckTable::new();
        let roster = Roster::rebuild(PeerId::LOCAL, &[]);

        let slot = accept_input(&mut world, &roster, &mut acks, PeerId(5), &input_from(None, 0));
        assert_eq!(slot, None);
    }
}
