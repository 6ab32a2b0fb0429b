use std::collections::HashMap;

use crate::net::{EntityId, PeerId, VersionId};

/// Newest full snapshot version each peer has confirmed, per entity.
///
/// The per-peer fallback is the version a client last reported in its input
/// stream; it is only consulted when no per-entity ack exists.
#[derive(Debug, Default)]
pub struct AckTable {
    entries: HashMap<(EntityId, PeerId), VersionId>,
    fallback: HashMap<PeerId, VersionId>,
}

impl AckTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the recorded ack moved forward.
    pub fn record(&mut self, entity_id: EntityId, peer: PeerId, version_id: VersionId) -> bool {
        let entry = self.entries.entry((entity_id, peer)).or_insert(0);
        if version_id > *entry {
            *entry = version_id;
            true
        } else {
            false
        }
    }

    pub fn record_fallback(&mut self, peer: PeerId, version_id: VersionId) {
        if version_id == 0 {
            return;
        }
        self.fallback.insert(peer, version_id);
    }

    pub fn entity_ack(&self, entity_id: EntityId, peer: PeerId) -> Option<VersionId> {
        self.entries
            .get(&(entity_id, peer))
            .copied()
            .filter(|version| *version > 0)
    }

    pub fn acked_version(&self, entity_id: EntityId, peer: PeerId) -> Option<VersionId> {
        self.entity_ack(entity_id, peer)
            .or_else(|| self.fallback.get(&peer).copied())
    }

    /// Oldest version still needed by any of `peers`, or None if one of them
    /// has not acknowledged this entity at all.
    pub fn min_acked(&self, entity_id: EntityId, peers: &[PeerId]) -> Option<VersionId> {
        let mut min: Option<VersionId> = None;
        for peer in peers {
            let version = self.entity_ack(entity_id, *peer)?;
            min = Some(min.map_or(version, |m| m.min(version)));
        }
        min
    }

    pub fn forget_peer(&mut self, peer: PeerId) {
        self.entries.retain(|(_, p), _| *p != peer);
        self.fallback.remove(&peer);
    }

    pub fn forget_entity(&mut self, entity_id: EntityId) {
        self.entries.retain(|(e, _), _| *e != entity_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acks_only_move_forward() {
        let mut acks = AckTable::new();
        let peer = PeerId(1);

        assert!(acks.record(4, peer, 3));
        assert!(!acks.record(4, peer, 2));
        assert!(!acks.record(4, peer, 3));
        assert_eq!(acks.acked_version(4, peer), Some(3));
    }

    #[test]
    fn test_fallback_only_when_entity_unacked() {
        let mut acks = AckTable::new();
        let peer = PeerId(1);
        acks.record_fallback(peer, 9);
        acks.record(1, peer, 2);

        assert_eq!(acks.acked_version(1, peer), Some(2));
        assert_eq!(acks.acked_version(5, peer), Some(9));
        assert_eq!(acks.entity_ack(5, peer), None);
    }

    #[test]
    fn test_min_acked_requires_every_peer() {
        let mut acks = AckTable::new();
        let peers = [PeerId(1), PeerId(2)];
        acks.record(1, peers[0], 7);

        assert_eq!(acks.min_acked(1, &peers), None);

        acks.record(1, peers[1], 5);
        assert_eq!(acks.min_acked(1, &peers), Some(5));
        assert_eq!(acks.min_acked(1, &[]), None);
    }

    #[test]
    fn test_forget_peer_and_entity() {
        let mut acks = AckTable::new();
        acks.record(1, PeerId(1), 1);
        acks.record(2, PeerId(1), 1);
        acks.record(1, PeerId(2), 1);
        acks.record_fallback(PeerId(1), 4);

        acks.forget_peer(PeerId(1));
        assert_eq!(acks.len(), 1);
        assert_eq!(acks.acked_version(2, PeerId(1)), None);

        acks.forget_entity(1);
        assert!(acks.is_empty());
    }
}
