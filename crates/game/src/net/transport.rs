use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::io;
use std::rc::Rc;

use super::frame::PacketError;

/// Connection identity of a participant.
///
/// The authoritative server is always `PeerId::LOCAL`; transports hand out
/// remote identities from 1 upwards in connection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u32);

impl PeerId {
    pub const LOCAL: PeerId = PeerId(0);
    pub const SERVER: PeerId = PeerId::LOCAL;
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    Message { sender: PeerId, payload: Vec<u8> },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    Oversize { size: usize, limit: usize },
    #[error("not connected")]
    NotConnected,
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
}

/// Message-oriented transport with per-peer ordered, lossy delivery.
pub trait Transport {
    /// Drains everything received since the last poll without blocking.
    fn poll(&mut self) -> Result<Vec<TransportEvent>, TransportError>;

    fn send_to(&mut self, peer: PeerId, payload: &[u8]) -> Result<(), TransportError>;

    fn broadcast(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Remote peers currently connected, in connection order.
    fn connected_peers(&self) -> Vec<PeerId>;

    /// Identity assigned to this endpoint, once known.
    fn local_id(&self) -> Option<PeerId>;
}

type DropFilter = Box<dyn FnMut(PeerId, PeerId, &[u8]) -> bool>;

#[derive(Default)]
struct LoopbackState {
    inboxes: BTreeMap<PeerId, VecDeque<TransportEvent>>,
    next_peer: u32,
    drop_filter: Option<DropFilter>,
    dropped: u64,
}

impl LoopbackState {
    fn deliver(&mut self, from: PeerId, to: PeerId, payload: &[u8]) {
        if let Some(filter) = self.drop_filter.as_mut() {
            if filter(from, to, payload) {
                self.dropped += 1;
                return;
            }
        }
        if let Some(inbox) = self.inboxes.get_mut(&to) {
            inbox.push_back(TransportEvent::Message {
                sender: from,
                payload: payload.to_vec(),
            });
        }
    }

    fn remote_peers(&self) -> Vec<PeerId> {
        self.inboxes
            .keys()
            .copied()
            .filter(|peer| *peer != PeerId::SERVER)
            .collect()
    }
}

/// In-process network joining one server endpoint and any number of clients.
///
/// Delivery is ordered and synchronous; an optional drop filter simulates
/// loss. Intended for tests and local play.
#[derive(Clone)]
pub struct LoopbackNetwork {
    state: Rc<RefCell<LoopbackState>>,
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        let mut state = LoopbackState {
            next_peer: 1,
            ..Default::default()
        };
        state.inboxes.insert(PeerId::SERVER, VecDeque::new());
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn server(&self) -> LoopbackEndpoint {
        LoopbackEndpoint {
            id: PeerId::SERVER,
            state: Rc::clone(&self.state),
        }
    }

    pub fn connect(&self) -> LoopbackEndpoint {
        let mut state = self.state.borrow_mut();
        let id = PeerId(state.next_peer);
        state.next_peer += 1;

        state
            .inboxes
            .insert(id, VecDeque::from([TransportEvent::Connected(PeerId::SERVER)]));
        if let Some(server) = state.inboxes.get_mut(&PeerId::SERVER) {
            server.push_back(TransportEvent::Connected(id));
        }

        LoopbackEndpoint {
            id,
            state: Rc::clone(&self.state),
        }
    }

    pub fn disconnect(&self, peer: PeerId) {
        let mut state = self.state.borrow_mut();
        if state.inboxes.remove(&peer).is_some() {
            if let Some(server) = state.inboxes.get_mut(&PeerId::SERVER) {
                server.push_back(TransportEvent::Disconnected(peer));
            }
        }
    }

    /// Installs a filter called as `(from, to, payload)`; returning true drops the message.
    pub fn set_drop_filter(&self, filter: impl FnMut(PeerId, PeerId, &[u8]) -> bool + 'static) {
        self.state.borrow_mut().drop_filter = Some(Box::new(filter));
    }

    pub fn clear_drop_filter(&self) {
        self.state.borrow_mut().drop_filter = None;
    }

    pub fn dropped(&self) -> u64 {
        self.state.borrow().dropped
    }
}

pub struct LoopbackEndpoint {
    id: PeerId,
    state: Rc<RefCell<LoopbackState>>,
}

impl Transport for LoopbackEndpoint {
    fn poll(&mut self) -> Result<Vec<TransportEvent>, TransportError> {
        let mut state = self.state.borrow_mut();
        Ok(state
            .inboxes
            .get_mut(&self.id)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default())
    }

    fn send_to(&mut self, peer: PeerId, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if !state.inboxes.contains_key(&self.id) {
            return Err(TransportError::NotConnected);
        }
        if !state.inboxes.contains_key(&peer) {
            return Err(TransportError::UnknownPeer(peer));
        }
        state.deliver(self.id, peer, payload);
        Ok(())
    }

    fn broadcast(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if !state.inboxes.contains_key(&self.id) {
            return Err(TransportError::NotConnected);
        }
        let targets: Vec<PeerId> = if self.id == PeerId::SERVER {
            state.remote_peers()
        } else {
            vec![PeerId::SERVER]
        };
        for peer in targets {
            state.deliver(self.id, peer, payload);
        }
        Ok(())
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        let state = self.state.borrow();
        if self.id == PeerId::SERVER {
            state.remote_peers()
        } else if state.inboxes.contains_key(&self.id) {
            vec![PeerId::SERVER]
        } else {
            Vec::new()
        }
    }

    fn local_id(&self) -> Option<PeerId> {
        Some(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_assigns_ids_in_connection_order() {
        let network = LoopbackNetwork::new();
        let mut server = network.server();
        let a = network.connect();
        let b = network.connect();

        assert_eq!(a.local_id(), Some(PeerId(1)));
        assert_eq!(b.local_id(), Some(PeerId(2)));
        assert_eq!(server.connected_peers(), vec![PeerId(1), PeerId(2)]);

        let events = server.poll().unwrap();
        assert_eq!(
            events,
            vec![
                TransportEvent::Connected(PeerId(1)),
                TransportEvent::Connected(PeerId(2)),
            ]
        );
    }

    #[test]
    fn test_loopback_broadcast_and_drop_filter() {
        let network = LoopbackNetwork::new();
        let mut server = network.server();
        let mut a = network.connect();
        let mut b = network.connect();
        a.poll().unwrap();
        b.poll().unwrap();

        network.set_drop_filter(|_, to, _| to == PeerId(2));
        server.broadcast(&[1, 2, 3]).unwrap();

        assert_eq!(
            a.poll().unwrap(),
            vec![TransportEvent::Message {
                sender: PeerId::SERVER,
                payload: vec![1, 2, 3],
            }]
        );
        assert!(b.poll().unwrap().is_empty());
        assert_eq!(network.dropped(), 1);
    }

    #[test]
    fn test_loopback_disconnect_notifies_server() {
        let network = LoopbackNetwork::new();
        let mut server = network.server();
        let mut a = network.connect();
        server.poll().unwrap();

        network.disconnect(PeerId(1));

        assert_eq!(
            server.poll().unwrap(),
            vec![TransportEvent::Disconnected(PeerId(1))]
        );
        assert!(server.connected_peers().is_empty());
        assert!(matches!(
            a.send_to(PeerId::SERVER, &[0]),
            Err(TransportError::NotConnected)
        ));
    }
}
