use std::collections::BTreeMap;

use super::acks::AckTable;
use super::replica::{EntityReplica, ReplicaDiagnostics, Snapshot};
use super::scheduler::PassKind;
use crate::net::{DespawnMessage, EntityId, FullMessage, Message, PeerId, VersionId};
use crate::world::EntityStore;

/// Full passes that repeat the despawn notice for a removed entity.
const DESPAWN_FULL_PASSES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    All,
    Peer(PeerId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundSnapshot {
    pub recipients: Recipients,
    pub message: Message,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncChanges {
    pub added: Vec<EntityId>,
    pub removed: Vec<EntityId>,
}

/// All replicas owned by one participant, keyed by entity id.
#[derive(Debug)]
pub struct Replicator {
    replicas: BTreeMap<EntityId, EntityReplica>,
    max_history: usize,
    last_accepted_version: VersionId,
    unknown_deltas: u64,
    /// Removed entities still being announced, with full passes left.
    departed: BTreeMap<EntityId, u32>,
}

impl Replicator {
    pub fn new(max_history: usize) -> Self {
        Self {
            replicas: BTreeMap::new(),
            max_history,
            last_accepted_version: 0,
            unknown_deltas: 0,
            departed: BTreeMap::new(),
        }
    }

    pub fn track(&mut self, entity_id: EntityId) -> &mut EntityReplica {
        let max_history = self.max_history;
        self.replicas
            .entry(entity_id)
            .or_insert_with(|| EntityReplica::new(entity_id, max_history))
    }

    pub fn untrack(&mut self, entity_id: EntityId) -> Option<EntityReplica> {
        self.replicas.remove(&entity_id)
    }

    pub fn get(&self, entity_id: EntityId) -> Option<&EntityReplica> {
        self.replicas.get(&entity_id)
    }

    pub fn replicas(&self) -> impl Iterator<Item = &EntityReplica> {
        self.replicas.values()
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.replicas.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Version of the most recently accepted full snapshot, 0 before any.
    pub fn last_accepted_version(&self) -> VersionId {
        self.last_accepted_version
    }

    pub fn diagnostics(&self) -> ReplicaDiagnostics {
        let mut total = ReplicaDiagnostics {
            orphaned_delta: self.unknown_deltas,
            ..Default::default()
        };
        for replica in self.replicas.values() {
            total += replica.diagnostics();
        }
        total
    }

    /// Tracks new entities of `store` and drops replicas whose entity is gone.
    /// Dropped entities are announced to peers by the following passes.
    pub fn sync_with<S: EntityStore + ?Sized>(&mut self, store: &S) -> SyncChanges {
        let ids = store.entity_ids();
        let mut changes = SyncChanges::default();

        self.replicas.retain(|id, _| {
            let keep = ids.binary_search(id).is_ok();
            if !keep {
                changes.removed.push(*id);
            }
            keep
        });
        for id in &changes.removed {
            self.departed.insert(*id, DESPAWN_FULL_PASSES);
        }
        for id in ids {
            if !self.replicas.contains_key(&id) {
                self.track(id);
                self.departed.remove(&id);
                changes.added.push(id);
            }
        }
        changes
    }

    /// Applies an inbound snapshot message. A full snapshot for an unknown
    /// entity starts tracking it; a delta for one is rejected. A despawn
    /// removes the replica and the entity.
    pub fn apply<S: EntityStore + ?Sized>(&mut self, message: &Message, store: &mut S) -> bool {
        match message {
            Message::Full(full) => {
                let accepted = self.track(full.entity_id).apply_full(full, store);
                if accepted {
                    self.last_accepted_version = full.state.version_id;
                }
                accepted
            }
            Message::Delta(delta) => match self.replicas.get_mut(&delta.entity_id) {
                Some(replica) => replica.apply_delta(delta, store),
                None => {
                    log::debug!("Delta for untracked entity {}", delta.entity_id);
                    self.unknown_deltas += 1;
                    false
                }
            },
            Message::Despawn(despawn) => {
                let tracked = self.untrack(despawn.entity_id).is_some();
                let removed = store.remove_entity(despawn.entity_id);
                tracked || removed
            }
            _ => false,
        }
    }

    /// Produces one pass worth of snapshot messages for `peers`.
    ///
    /// Peers sharing a delta base receive the same message; at most one new
    /// full version is stamped per entity per pass. Full passes also prune
    /// history below what every peer has acknowledged. Despawn notices for
    /// recently removed entities lead every pass.
    pub fn run_pass<S: EntityStore + ?Sized>(
        &mut self,
        kind: PassKind,
        store: &S,
        acks: &AckTable,
        peers: &[PeerId],
    ) -> Vec<OutboundSnapshot> {
        let mut outbound = Vec::new();

        if !peers.is_empty() {
            outbound.extend(self.departed.keys().map(|id| OutboundSnapshot {
                recipients: Recipients::All,
                message: Message::Despawn(DespawnMessage { entity_id: *id }),
            }));
        }
        if !kind.wants_delta() {
            self.departed.retain(|_, remaining| {
                *remaining -= 1;
                *remaining > 0
            });
        }

        for (id, replica) in self.replicas.iter_mut() {
            let Some(current) = store.transform(*id) else {
                continue;
            };

            if !kind.wants_delta() {
                let full = replica.produce_full(current);
                if !peers.is_empty() {
                    outbound.push(OutboundSnapshot {
                        recipients: Recipients::All,
                        message: Message::Full(full),
                    });
                }
                if let Some(min) = acks.min_acked(*id, peers) {
                    replica.prune_history(min);
                }
                continue;
            }

            let mut groups: BTreeMap<Option<VersionId>, Vec<PeerId>> = BTreeMap::new();
            for peer in peers {
                groups
                    .entry(acks.acked_version(*id, *peer))
                    .or_default()
                    .push(*peer);
            }

            let single_group = groups.len() == 1;
            let mut pass_full: Option<FullMessage> = None;
            for (base, members) in groups {
                let snapshot = match base.and_then(|v| replica.produce_delta(current, v)) {
                    Some(delta) => Snapshot::Delta(delta),
                    None => Snapshot::Full(
                        *pass_full.get_or_insert_with(|| replica.produce_full(current)),
                    ),
                };
                let message = Message::from(snapshot);

                if single_group {
                    outbound.push(OutboundSnapshot {
                        recipients: Recipients::All,
                        message,
                    });
                } else {
                    outbound.extend(members.into_iter().map(|peer| OutboundSnapshot {
                        recipients: Recipients::Peer(peer),
                        message: message.clone(),
                    }));
                }
            }
        }

        outbound
    }
}
