use std::collections::VecDeque;
use std::ops::AddAssign;

use glam::{Quat, Vec3};

use super::state::ReplicatedState;
use crate::net::{
    DeltaMessage, EntityId, FullMessage, Message, ORIENTATION_QUANT_SCALE, VersionId,
};
use crate::world::{EntityStore, Transform};

/// A snapshot message produced for one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Snapshot {
    Full(FullMessage),
    Delta(DeltaMessage),
}

impl Snapshot {
    pub fn is_full(&self) -> bool {
        matches!(self, Snapshot::Full(_))
    }
}

impl From<Snapshot> for Message {
    fn from(snapshot: Snapshot) -> Self {
        match snapshot {
            Snapshot::Full(full) => Message::Full(full),
            Snapshot::Delta(delta) => Message::Delta(delta),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicaDiagnostics {
    pub fulls_accepted: u64,
    pub deltas_accepted: u64,
    pub stale_full: u64,
    pub orphaned_delta: u64,
}

impl AddAssign for ReplicaDiagnostics {
    fn add_assign(&mut self, other: Self) {
        self.fulls_accepted += other.fulls_accepted;
        self.deltas_accepted += other.deltas_accepted;
        self.stale_full += other.stale_full;
        self.orphaned_delta += other.orphaned_delta;
    }
}

pub fn quantize_position(delta: Vec3) -> [i8; 3] {
    delta.to_array().map(|component| component as i8)
}

pub fn quantize_orientation(current: Quat, base: Quat) -> [i8; 4] {
    let current = current.to_array();
    let base = base.to_array();
    std::array::from_fn(|i| ((current[i] - base[i]) * ORIENTATION_QUANT_SCALE) as i8)
}

pub fn dequantize_position(base: Vec3, delta: [i8; 3]) -> Vec3 {
    base + Vec3::from_array(delta.map(f32::from))
}

/// Component-wise reconstruction; the result is not renormalised.
pub fn dequantize_orientation(base: Quat, delta: [i8; 4]) -> Quat {
    let base = base.to_array();
    Quat::from_array(std::array::from_fn(|i| {
        base[i] + f32::from(delta[i]) / ORIENTATION_QUANT_SCALE
    }))
}

/// Versioned replication state of a single entity.
///
/// On the sending side every full snapshot becomes a new history entry that
/// later deltas can be based on. On the receiving side only accepted
/// messages touch the history.
#[derive(Debug, Clone)]
pub struct EntityReplica {
    entity_id: EntityId,
    latest_state: Option<ReplicatedState>,
    history: VecDeque<ReplicatedState>,
    max_history: usize,
    diagnostics: ReplicaDiagnostics,
}

impl EntityReplica {
    pub fn new(entity_id: EntityId, max_history: usize) -> Self {
        Self {
            entity_id,
            latest_state: None,
            history: VecDeque::new(),
            max_history: max_history.max(1),
            diagnostics: ReplicaDiagnostics::default(),
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn latest(&self) -> Option<&ReplicatedState> {
        self.latest_state.as_ref()
    }

    pub fn latest_version(&self) -> Option<VersionId> {
        self.latest_state.map(|state| state.version_id)
    }

    pub fn history(&self) -> impl Iterator<Item = &ReplicatedState> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn diagnostics(&self) -> ReplicaDiagnostics {
        self.diagnostics
    }

    fn find(&self, version_id: VersionId) -> Option<&ReplicatedState> {
        self.history
            .binary_search_by_key(&version_id, |state| state.version_id)
            .ok()
            .map(|index| &self.history[index])
    }

    fn push_history(&mut self, state: ReplicatedState) {
        if self
            .history
            .back()
            .is_some_and(|last| last.version_id >= state.version_id)
        {
            return;
        }
        self.history.push_back(state);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    /// Produces a delta against `acked_version` when asked for one and that
    /// version is still in history; otherwise a new full snapshot.
    pub fn produce_snapshot(
        &mut self,
        current: Transform,
        want_delta: bool,
        acked_version: Option<VersionId>,
    ) -> Snapshot {
        if want_delta {
            if let Some(delta) = acked_version.and_then(|base| self.produce_delta(current, base)) {
                return Snapshot::Delta(delta);
            }
        }
        Snapshot::Full(self.produce_full(current))
    }

    /// Stamps `current` with the next version and records it as a delta base.
    pub fn produce_full(&mut self, current: Transform) -> FullMessage {
        let version_id = self
            .latest_state
            .map_or(1, |state| state.version_id.wrapping_add(1));
        let state = ReplicatedState::new(version_id, current);
        self.latest_state = Some(state);
        self.push_history(state);

        FullMessage {
            entity_id: self.entity_id,
            state,
        }
    }

    pub fn produce_delta(&self, current: Transform, base_version: VersionId) -> Option<DeltaMessage> {
        let base = self.find(base_version)?;
        Some(DeltaMessage {
            entity_id: self.entity_id,
            base_version_id: base.version_id,
            pos_delta: quantize_position(current.position - base.position),
            orient_delta: quantize_orientation(current.orientation, base.orientation),
        })
    }

    pub fn apply_full<S: EntityStore + ?Sized>(&mut self, msg: &FullMessage, store: &mut S) -> bool {
        if let Some(latest) = self.latest_state {
            if msg.state.version_id < latest.version_id {
                log::debug!(
                    "Entity {}: stale full v{} behind v{}",
                    self.entity_id,
                    msg.state.version_id,
                    latest.version_id
                );
                self.diagnostics.stale_full += 1;
                return false;
            }
        }

        self.latest_state = Some(msg.state);
        store.ensure_entity(self.entity_id);
        store.set_transform(self.entity_id, msg.state.transform());
        self.push_history(msg.state);
        self.diagnostics.fulls_accepted += 1;
        true
    }

    pub fn apply_delta<S: EntityStore + ?Sized>(&mut self, msg: &DeltaMessage, store: &mut S) -> bool {
        let Some(latest) = self
            .latest_state
            .filter(|latest| latest.version_id == msg.base_version_id)
        else {
            log::debug!(
                "Entity {}: orphaned delta on base v{} (latest {:?})",
                self.entity_id,
                msg.base_version_id,
                self.latest_version()
            );
            self.diagnostics.orphaned_delta += 1;
            return false;
        };

        let transform = Transform::new(
            dequantize_position(latest.position, msg.pos_delta),
            dequantize_orientation(latest.orientation, msg.orient_delta),
        );
        store.ensure_entity(self.entity_id);
        store.set_transform(self.entity_id, transform);
        self.prune_history(msg.base_version_id);
        self.diagnostics.deltas_accepted += 1;
        true
    }

    /// Drops every history entry older than `min_acknowledged`.
    pub fn prune_history(&mut self, min_acknowledged: VersionId) {
        let keep_from = self
            .history
            .partition_point(|state| state.version_id < min_acknowledged);
        self.history.drain(..keep_from);
    }
}
