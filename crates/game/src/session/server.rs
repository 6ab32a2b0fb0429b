use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use super::config::SessionConfig;
use super::input::accept_input;
use super::roster::{Roster, SlotChange};
use crate::net::{
    AppMessage, Dispatcher, EntityId, HandlerRef, Message, MessageTag, PeerId, Transport,
    TransportError, TransportEvent, VersionId, handler_ref,
};
use crate::player::PlayerInputs;
use crate::replication::{AckTable, PassKind, Recipients, Replicator, SnapshotScheduler};
use crate::simulation::{FixedTimestep, Simulation};
use crate::world::{EntityStore, World};

/// State shared between the session and its message handlers.
struct ServerState {
    simulation: Simulation,
    roster: Roster,
    acks: AckTable,
}

/// Authoritative participant: owns the world, relays inputs into it and
/// replicates it to every connected peer.
pub struct ServerSession<T: Transport> {
    transport: T,
    dispatcher: Dispatcher,
    state: Rc<RefCell<ServerState>>,
    replicator: Replicator,
    scheduler: SnapshotScheduler,
    snapshot_timer: FixedTimestep,
    local_input: Option<PlayerInputs>,
    config: SessionConfig,
}

impl<T: Transport> ServerSession<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let state = Rc::new(RefCell::new(ServerState {
            simulation: Simulation::new(config.simulation_rate, config.movement.clone()),
            roster: Roster::new(),
            acks: AckTable::new(),
        }));

        let mut dispatcher = Dispatcher::new();
        {
            let state = Rc::clone(&state);
            dispatcher.register_handler(
                MessageTag::PlayerInput,
                handler_ref(move |_: MessageTag, message: &Message, sender: PeerId| {
                    if let Message::Input(input) = message {
                        let state = &mut *state.borrow_mut();
                        accept_input(
                            &mut state.simulation.world,
                            &state.roster,
                            &mut state.acks,
                            sender,
                            input,
                        );
                    }
                }),
            );
        }
        {
            let state = Rc::clone(&state);
            dispatcher.register_handler(
                MessageTag::Ack,
                handler_ref(move |_: MessageTag, message: &Message, sender: PeerId| {
                    if let Message::Ack(ack) = message {
                        state
                            .borrow_mut()
                            .acks
                            .record(ack.entity_id, sender, ack.version_id);
                    }
                }),
            );
        }

        Self {
            transport,
            dispatcher,
            state,
            replicator: Replicator::new(config.replication.max_history),
            scheduler: SnapshotScheduler::new(config.replication.full_frame_interval),
            snapshot_timer: FixedTimestep::new(config.replication.snapshot_rate),
            local_input: None,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn world(&self) -> Ref<'_, World> {
        Ref::map(self.state.borrow(), |state| &state.simulation.world)
    }

    pub fn world_mut(&self) -> RefMut<'_, World> {
        RefMut::map(self.state.borrow_mut(), |state| &mut state.simulation.world)
    }

    pub fn roster(&self) -> Roster {
        self.state.borrow().roster
    }

    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    pub fn scheduler(&self) -> &SnapshotScheduler {
        &self.scheduler
    }

    pub fn acked_version(&self, entity_id: EntityId, peer: PeerId) -> Option<VersionId> {
        self.state.borrow().acks.acked_version(entity_id, peer)
    }

    pub fn tick(&self) -> u32 {
        self.state.borrow().simulation.tick()
    }

    /// Inputs for the server's own player, applied on every simulation step
    /// until replaced.
    pub fn set_local_input(&mut self, inputs: Option<PlayerInputs>) {
        self.local_input = inputs;
    }

    pub fn register_handler(&mut self, tag: MessageTag, handler: HandlerRef) {
        self.dispatcher.register_handler(tag, handler);
    }

    pub fn broadcast_app(&mut self, tag: MessageTag, payload: Vec<u8>) -> Result<(), TransportError> {
        let bytes = Message::App(AppMessage { tag, payload }).encode();
        self.transport.broadcast(&bytes)
    }

    /// One frame: receive and dispatch, run due snapshot passes, then step
    /// the simulation.
    pub fn update(&mut self, delta: f32) -> Result<(), TransportError> {
        self.receive()?;

        self.snapshot_timer.accumulate(delta);
        while self.snapshot_timer.consume_tick() {
            self.snapshot_tick()?;
        }

        let local_input = self.local_input;
        self.state
            .borrow_mut()
            .simulation
            .update_with(delta, |world| {
                if let Some(inputs) = local_input {
                    world.set_input(0, inputs);
                }
            });
        Ok(())
    }

    fn receive(&mut self) -> Result<(), TransportError> {
        for event in self.transport.poll()? {
            match event {
                TransportEvent::Connected(peer) => {
                    log::info!("{} connected", peer);
                }
                TransportEvent::Disconnected(peer) => {
                    log::info!("{} disconnected", peer);
                    self.state.borrow_mut().acks.forget_peer(peer);
                }
                TransportEvent::Message { sender, payload } => {
                    if let Err(e) = self.dispatcher.dispatch_bytes(&payload, sender) {
                        log::warn!("Malformed message from {}: {}", sender, e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Roster rebuild and broadcast, replica sync, then one scheduler pass.
    pub fn snapshot_tick(&mut self) -> Result<PassKind, TransportError> {
        let peers = self.transport.connected_peers();
        self.update_roster(&peers)?;

        let kind = self.scheduler.next_pass();
        let outbound = {
            let state = &mut *self.state.borrow_mut();
            let world = &state.simulation.world;
            for id in self.replicator.sync_with(world).removed {
                log::debug!("Stopped replicating entity {}", id);
                state.acks.forget_entity(id);
            }
            self.replicator.run_pass(kind, world, &state.acks, &peers)
        };

        for snapshot in outbound {
            let bytes = snapshot.message.encode();
            match snapshot.recipients {
                Recipients::All => self.transport.broadcast(&bytes)?,
                Recipients::Peer(peer) => self.transport.send_to(peer, &bytes)?,
            }
        }
        Ok(kind)
    }

    fn update_roster(&mut self, peers: &[PeerId]) -> Result<(), TransportError> {
        let roster = {
            let state = &mut *self.state.borrow_mut();
            let next = Roster::rebuild(PeerId::LOCAL, peers);

            for change in state.roster.changes_to(&next) {
                match change {
                    SlotChange::Left { slot, peer } => {
                        log::info!("{} left slot {}", peer, slot);
                        state.simulation.world.remove_entity(slot as EntityId);
                        state.acks.forget_entity(slot as EntityId);
                    }
                    SlotChange::Joined { slot, peer } => {
                        log::info!("{} took slot {}", peer, slot);
                        let spawn = state.simulation.movement.spawn_point(slot);
                        state.simulation.world.spawn_player(slot, spawn);
                    }
                }
            }
            state.roster = next;
            next
        };

        if peers.is_empty() {
            return Ok(());
        }
        self.transport
            .broadcast(&Message::Roster(roster.to_message()).encode())
    }
}
