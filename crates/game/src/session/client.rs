use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use super::config::SessionConfig;
use super::input::outgoing_input;
use super::roster::{Roster, SlotChange};
use crate::net::{
    AckMessage, AppMessage, Dispatcher, EntityId, HandlerRef, MAX_PLAYERS, Message, MessageTag,
    PeerId, Transport, TransportError, TransportEvent, VersionId, handler_ref,
};
use crate::player::PlayerInputs;
use crate::replication::{ReplicaDiagnostics, Replicator};
use crate::simulation::FixedTimestep;
use crate::world::{EntityStore, World};

const APP_TAGS: [MessageTag; 5] = [
    MessageTag::GameStart,
    MessageTag::GameEnd,
    MessageTag::InventorySync,
    MessageTag::BuffSync,
    MessageTag::SuspicionSync,
];

struct ClientState {
    world: World,
    replicator: Replicator,
    roster: Roster,
    local_id: Option<PeerId>,
    pending_acks: Vec<AckMessage>,
    app_inbox: VecDeque<AppMessage>,
}

impl ClientState {
    fn apply_snapshot(&mut self, message: &Message) {
        if !self.replicator.apply(message, &mut self.world) {
            return;
        }
        if let Message::Full(full) = message {
            self.pending_acks.push(AckMessage {
                entity_id: full.entity_id,
                version_id: full.state.version_id,
            });
        }
    }

    /// A vacated slot loses its replica so the next occupant's versions are
    /// accepted from scratch; the entity itself stays while the slot is taken.
    fn apply_roster(&mut self, next: Roster) {
        for change in self.roster.changes_to(&next) {
            if let SlotChange::Left { slot, .. } = change {
                self.replicator.untrack(slot as EntityId);
                if next.peer_in(slot).is_none() {
                    self.world.remove_entity(slot as EntityId);
                }
            }
        }
        self.roster = next;
    }
}

/// Mirror of the server's world, fed by snapshots, sending local inputs.
pub struct ClientSession<T: Transport> {
    transport: T,
    dispatcher: Dispatcher,
    state: Rc<RefCell<ClientState>>,
    input_timer: FixedTimestep,
    connected: bool,
}

impl<T: Transport> ClientSession<T> {
    pub fn new(transport: T, config: &SessionConfig) -> Self {
        let state = Rc::new(RefCell::new(ClientState {
            world: World::new(),
            replicator: Replicator::new(config.replication.max_history),
            roster: Roster::new(),
            local_id: transport.local_id(),
            pending_acks: Vec::new(),
            app_inbox: VecDeque::new(),
        }));

        let mut dispatcher = Dispatcher::new();

        let snapshots = {
            let state = Rc::clone(&state);
            handler_ref(move |_: MessageTag, message: &Message, _: PeerId| {
                state.borrow_mut().apply_snapshot(message);
            })
        };
        dispatcher.register_handler(MessageTag::FullState, Rc::clone(&snapshots));
        dispatcher.register_handler(MessageTag::DeltaState, Rc::clone(&snapshots));
        dispatcher.register_handler(MessageTag::Despawn, snapshots);

        {
            let state = Rc::clone(&state);
            dispatcher.register_handler(
                MessageTag::Roster,
                handler_ref(move |_: MessageTag, message: &Message, _: PeerId| {
                    if let Message::Roster(roster) = message {
                        state.borrow_mut().apply_roster(Roster::from(*roster));
                    }
                }),
            );
        }

        let inbox = {
            let state = Rc::clone(&state);
            handler_ref(move |_: MessageTag, message: &Message, _: PeerId| {
                if let Message::App(app) = message {
                    state.borrow_mut().app_inbox.push_back(app.clone());
                }
            })
        };
        for tag in APP_TAGS {
            dispatcher.register_handler(tag, Rc::clone(&inbox));
        }

        Self {
            transport,
            dispatcher,
            state,
            input_timer: FixedTimestep::new(config.simulation_rate),
            connected: false,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn world(&self) -> Ref<'_, World> {
        Ref::map(self.state.borrow(), |state| &state.world)
    }

    pub fn roster(&self) -> Roster {
        self.state.borrow().roster
    }

    pub fn local_id(&self) -> Option<PeerId> {
        self.state.borrow().local_id
    }

    /// Slot the server assigned to this participant, once a roster arrived.
    pub fn player_slot(&self) -> Option<usize> {
        let state = self.state.borrow();
        state
            .local_id
            .and_then(|id| state.roster.slot_of(id))
            .filter(|slot| *slot < MAX_PLAYERS)
    }

    pub fn last_accepted_version(&self) -> VersionId {
        self.state.borrow().replicator.last_accepted_version()
    }

    pub fn diagnostics(&self) -> ReplicaDiagnostics {
        self.state.borrow().replicator.diagnostics()
    }

    pub fn tracked_entities(&self) -> Vec<EntityId> {
        self.state.borrow().replicator.entity_ids()
    }

    pub fn register_handler(&mut self, tag: MessageTag, handler: HandlerRef) {
        self.dispatcher.register_handler(tag, handler);
    }

    pub fn drain_app_messages(&mut self) -> Vec<AppMessage> {
        self.state.borrow_mut().app_inbox.drain(..).collect()
    }

    /// Receives and applies snapshots, then sends one input message per
    /// elapsed simulation step along with any pending acknowledgements.
    pub fn update(&mut self, delta: f32, inputs: PlayerInputs) -> Result<(), TransportError> {
        self.receive()?;

        self.input_timer.accumulate(delta);
        while self.input_timer.consume_tick() {
            if !self.connected {
                continue;
            }
            self.send_input(inputs)?;
            self.flush_acks()?;
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<(), TransportError> {
        let events = self.transport.poll()?;
        self.state.borrow_mut().local_id = self.transport.local_id();

        for event in events {
            match event {
                TransportEvent::Connected(peer) => {
                    log::info!("Connected to {} as {:?}", peer, self.transport.local_id());
                    self.connected = true;
                }
                TransportEvent::Disconnected(peer) => {
                    log::info!("Lost connection to {}", peer);
                    self.connected = false;
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

    fn send_input(&mut self, inputs: PlayerInputs) -> Result<(), TransportError> {
        let message = outgoing_input(self.player_slot(), inputs, self.last_accepted_version());
        self.transport
            .send_to(PeerId::SERVER, &Message::Input(message).encode())
    }

    fn flush_acks(&mut self) -> Result<(), TransportError> {
        let acks = std::mem::take(&mut self.state.borrow_mut().pending_acks);
        for ack in acks {
            self.transport
                .send_to(PeerId::SERVER, &Message::Ack(ack).encode())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::*;
    use crate::net::{DeltaMessage, FullMessage, LoopbackNetwork, RosterMessage};
    use crate::replication::ReplicatedState;

    fn full(entity_id: EntityId, version_id: VersionId, position: Vec3) -> Vec<u8> {
        Message::Full(FullMessage {
            entity_id,
            state: ReplicatedState {
                version_id,
                position,
                orientation: Quat::IDENTITY,
            },
        })
        .encode()
    }

    fn setup() -> (crate::net::LoopbackEndpoint, ClientSession<crate::net::LoopbackEndpoint>) {
        let network = LoopbackNetwork::new();
        let server = network.server();
        let client = ClientSession::new(network.connect(), &SessionConfig::default());
        (server, client)
    }

    fn sent_by_client(server: &mut impl Transport) -> Vec<Message> {
        server
            .poll()
            .unwrap()
            .into_iter()
            .filter_map(|event| match event {
                TransportEvent::Message { payload, .. } => Message::decode(&payload).ok(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_full_is_applied_and_acknowledged() {
        let (mut server, mut client) = setup();
        server.send_to(PeerId(1), &full(10, 3, Vec3::ONE)).unwrap();

        client.update(1.0 / 60.0, PlayerInputs::default()).unwrap();

        assert_eq!(client.world().transform(10).unwrap().position, Vec3::ONE);
        assert_eq!(client.last_accepted_version(), 3);

        let sent = sent_by_client(&mut server);
        assert!(matches!(
            sent.as_slice(),
            [Message::Input(input), Message::Ack(ack)]
                if input.last_accepted_version_id == 3 && ack.version_id == 3
        ));
    }

    #[test]
    fn test_deltas_without_full_are_rejected() {
        let (mut server, mut client) = setup();
        for base in 0..3 {
            let delta = Message::Delta(DeltaMessage {
                entity_id: 10,
                base_version_id: base,
                pos_delta: [1, 1, 1],
                orient_delta: [0; 4],
            });
            server.send_to(PeerId(1), &delta.encode()).unwrap();
        }

        client.update(0.0, PlayerInputs::default()).unwrap();

        assert_eq!(client.world().entity_count(), 0);
        assert_eq!(client.diagnostics().orphaned_delta, 3);
    }

    #[test]
    fn test_roster_assigns_slot_and_despawns_vacated() {
        let (mut server, mut client) = setup();
        let both = RosterMessage {
            slots: [Some(PeerId::LOCAL), Some(PeerId(1)), Some(PeerId(2)), None],
        };
        server.send_to(PeerId(1), &Message::Roster(both).encode()).unwrap();
        server.send_to(PeerId(1), &full(2, 1, Vec3::ZERO)).unwrap();
        client.update(0.0, PlayerInputs::default()).unwrap();

        assert_eq!(client.player_slot(), Some(1));
        assert!(client.world().get_entity(2).is_some());

        let alone = RosterMessage {
            slots: [Some(PeerId::LOCAL), Some(PeerId(1)), None, None],
        };
        server.send_to(PeerId(1), &Message::Roster(alone).encode()).unwrap();
        client.update(0.0, PlayerInputs::default()).unwrap();

        assert!(client.world().get_entity(2).is_none());
        assert!(client.tracked_entities().is_empty());
    }

    #[test]
    fn test_new_occupant_restarts_slot_versions() {
        let (mut server, mut client) = setup();
        let before = RosterMessage {
            slots: [Some(PeerId::LOCAL), Some(PeerId(1)), Some(PeerId(2)), None],
        };
        server.send_to(PeerId(1), &Message::Roster(before).encode()).unwrap();
        server.send_to(PeerId(1), &full(2, 5, Vec3::ZERO)).unwrap();
        client.update(0.0, PlayerInputs::default()).unwrap();

        let after = RosterMessage {
            slots: [Some(PeerId::LOCAL), Some(PeerId(1)), Some(PeerId(3)), None],
        };
        server.send_to(PeerId(1), &Message::Roster(after).encode()).unwrap();
        client.update(0.0, PlayerInputs::default()).unwrap();

        assert!(client.world().get_entity(2).is_some());
        assert!(!client.tracked_entities().contains(&2));

        server.send_to(PeerId(1), &full(2, 1, Vec3::ONE)).unwrap();
        client.update(0.0, PlayerInputs::default()).unwrap();

        assert_eq!(client.world().transform(2).unwrap().position, Vec3::ONE);
        assert_eq!(client.diagnostics().stale_full, 0);
    }

    #[test]
    fn test_despawn_removes_mirrored_entity() {
        let (mut server, mut client) = setup();
        server.send_to(PeerId(1), &full(10, 1, Vec3::ONE)).unwrap();
        client.update(0.0, PlayerInputs::default()).unwrap();
        assert_eq!(client.tracked_entities(), vec![10]);

        let despawn = Message::Despawn(crate::net::DespawnMessage { entity_id: 10 });
        server.send_to(PeerId(1), &despawn.encode()).unwrap();
        client.update(0.0, PlayerInputs::default()).unwrap();

        assert!(client.world().get_entity(10).is_none());
        assert!(client.tracked_entities().is_empty());
    }

    #[test]
    fn test_app_messages_are_queued() {
        let (mut server, mut client) = setup();
        let start = Message::App(AppMessage {
            tag: MessageTag::GameStart,
            payload: vec![1, 2],
        });
        server.send_to(PeerId(1), &start.encode()).unwrap();

        client.update(0.0, PlayerInputs::default()).unwrap();

        let inbox = client.drain_app_messages();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].tag, MessageTag::GameStart);
        assert_eq!(inbox[0].payload, vec![1, 2]);
    }
}
