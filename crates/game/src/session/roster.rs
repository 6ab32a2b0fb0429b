use crate::net::{MAX_PLAYERS, PeerId, RosterMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotChange {
    Joined { slot: usize, peer: PeerId },
    Left { slot: usize, peer: PeerId },
}

/// Fixed-capacity mapping from player slot to connected participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Roster {
    slots: [Option<PeerId>; MAX_PLAYERS],
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot 0 is `local`; the remaining slots take `peers` in connection
    /// order. Peers beyond capacity stay unslotted.
    pub fn rebuild(local: PeerId, peers: &[PeerId]) -> Self {
        let mut ordered: Vec<PeerId> = peers.iter().copied().filter(|p| *p != local).collect();
        ordered.sort_unstable();
        ordered.dedup();

        let mut slots = [None; MAX_PLAYERS];
        slots[0] = Some(local);
        for (slot, peer) in slots.iter_mut().skip(1).zip(ordered) {
            *slot = Some(peer);
        }
        Self { slots }
    }

    pub fn slots(&self) -> &[Option<PeerId>; MAX_PLAYERS] {
        &self.slots
    }

    pub fn slot_of(&self, peer: PeerId) -> Option<usize> {
        self.slots.iter().position(|slot| *slot == Some(peer))
    }

    pub fn peer_in(&self, slot: usize) -> Option<PeerId> {
        self.slots.get(slot).copied().flatten()
    }

    pub fn occupied(&self) -> impl Iterator<Item = (usize, PeerId)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, peer)| peer.map(|peer| (slot, peer)))
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied().count()
    }

    /// Slot changes from `self` to `next`; departures come before arrivals.
    pub fn changes_to(&self, next: &Roster) -> Vec<SlotChange> {
        let mut left = Vec::new();
        let mut joined = Vec::new();
        for slot in 0..MAX_PLAYERS {
            let (before, after) = (self.slots[slot], next.slots[slot]);
            if before == after {
                continue;
            }
            if let Some(peer) = before {
                left.push(SlotChange::Left { slot, peer });
            }
            if let Some(peer) = after {
                joined.push(SlotChange::Joined { slot, peer });
            }
        }
        left.extend(joined);
        left
    }

    pub fn to_message(&self) -> RosterMessage {
        RosterMessage { slots: self.slots }
    }
}

impl From<RosterMessage> for Roster {
    fn from(message: RosterMessage) -> Self {
        Self {
            slots: message.slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_connections_fill_in_order() {
        let roster = Roster::rebuild(PeerId::LOCAL, &[PeerId(2), PeerId(1)]);

        assert_eq!(
            roster.slots(),
            &[Some(PeerId::LOCAL), Some(PeerId(1)), Some(PeerId(2)), None]
        );
        assert_eq!(roster.slot_of(PeerId(2)), Some(2));
        assert_eq!(roster.slot_of(PeerId(7)), None);
    }

    #[test]
    fn test_single_connection_leaves_slots_empty() {
        let peer_a = PeerId(1);
        let roster = Roster::rebuild(PeerId::LOCAL, &[peer_a]);

        assert_eq!(roster.slots(), &[Some(PeerId::LOCAL), Some(peer_a), None, None]);
        assert_eq!(roster.occupied_count(), 2);
    }

    #[test]
    fn test_overflow_peers_are_unslotted() {
        let peers: Vec<_> = (1..=6).map(PeerId).collect();
        let roster = Roster::rebuild(PeerId::LOCAL, &peers);

        assert_eq!(roster.occupied_count(), MAX_PLAYERS);
        assert_eq!(roster.slot_of(PeerId(4)), None);
    }

    #[test]
    fn test_changes_report_leave_before_join() {
        let before = Roster::rebuild(PeerId::LOCAL, &[PeerId(1), PeerId(2)]);
        let after = Roster::rebuild(PeerId::LOCAL, &[PeerId(2)]);

        assert_eq!(
            before.changes_to(&after),
            vec![
                SlotChange::Left { slot: 1, peer: PeerId(1) },
                SlotChange::Left { slot: 2, peer: PeerId(2) },
                SlotChange::Joined { slot: 1, peer: PeerId(2) },
            ]
        );
        assert!(after.changes_to(&after).is_empty());
    }

    #[test]
    fn test_message_round_trip_keeps_slots() {
        let roster = Roster::rebuild(PeerId::LOCAL, &[PeerId(3)]);
        assert_eq!(Roster::from(roster.to_message()), roster);
    }
}
