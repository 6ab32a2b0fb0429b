use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::frame::SequenceFilter;
use super::transport::PeerId;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
pub struct PeerConnection {
    pub addr: SocketAddr,
    pub peer_id: PeerId,
    pub client_salt: u64,
    pub send_sequence: u32,
    pub receive_filter: SequenceFilter,
    pub last_receive_time: Instant,
}

impl PeerConnection {
    pub fn new(addr: SocketAddr, peer_id: PeerId, client_salt: u64) -> Self {
        Self {
            addr,
            peer_id,
            client_salt,
            send_sequence: 0,
            receive_filter: SequenceFilter::new(),
            last_receive_time: Instant::now(),
        }
    }

    pub fn next_sequence(&mut self) -> u32 {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        sequence
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_receive_time.elapsed() > timeout
    }

    pub fn touch(&mut self) {
        self.last_receive_time = Instant::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmitError {
    #[error("server full")]
    Full,
}

/// Outcome of a connection request.
#[derive(Debug)]
pub struct Admission<'a> {
    pub peer: &'a mut PeerConnection,
    /// True when the peer was admitted by this request.
    pub is_new: bool,
    /// Earlier session from the same address that this request displaced.
    pub replaced: Option<PeerId>,
}

/// Server-side table of connected peers; ids are assigned in connection order.
#[derive(Debug)]
pub struct ConnectionManager {
    peers_by_addr: HashMap<SocketAddr, PeerId>,
    peers: BTreeMap<PeerId, PeerConnection>,
    next_peer_id: u32,
    max_peers: usize,
    timeout: Duration,
}

impl ConnectionManager {
    pub fn new(max_peers: usize) -> Self {
        Self::with_timeout(max_peers, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(max_peers: usize, timeout: Duration) -> Self {
        Self {
            peers_by_addr: HashMap::new(),
            peers: BTreeMap::new(),
            next_peer_id: 1,
            max_peers,
            timeout,
        }
    }

    /// Returns the peer for `addr`, admitting it first if it is new.
    pub fn admit(
        &mut self,
        addr: SocketAddr,
        client_salt: u64,
    ) -> Result<Admission<'_>, AdmitError> {
        let mut replaced = None;
        if let Some(&peer_id) = self.peers_by_addr.get(&addr) {
            let restarted = self
                .peers
                .get(&peer_id)
                .is_some_and(|peer| peer.client_salt != client_salt);
            if !restarted {
                let peer = self
                    .peers
                    .entry(peer_id)
                    .or_insert_with(|| PeerConnection::new(addr, peer_id, client_salt));
                return Ok(Admission {
                    peer,
                    is_new: false,
                    replaced: None,
                });
            }
            // Same address, new salt: the old session restarted.
            self.remove(peer_id);
            replaced = Some(peer_id);
        }

        if self.peers.len() >= self.max_peers {
            return Err(AdmitError::Full);
        }

        let peer_id = PeerId(self.next_peer_id);
        self.next_peer_id += 1;

        self.peers_by_addr.insert(addr, peer_id);
        let peer = self
            .peers
            .entry(peer_id)
            .or_insert_with(|| PeerConnection::new(addr, peer_id, client_salt));
        Ok(Admission {
            peer,
            is_new: true,
            replaced,
        })
    }

    pub fn get(&self, peer_id: PeerId) -> Option<&PeerConnection> {
        self.peers.get(&peer_id)
    }

    pub fn get_mut(&mut self, peer_id: PeerId) -> Option<&mut PeerConnection> {
        self.peers.get_mut(&peer_id)
    }

    pub fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut PeerConnection> {
        let peer_id = self.peers_by_addr.get(addr)?;
        self.peers.get_mut(peer_id)
    }

    pub fn remove(&mut self, peer_id: PeerId) -> Option<PeerConnection> {
        let peer = self.peers.remove(&peer_id)?;
        self.peers_by_addr.remove(&peer.addr);
        Some(peer)
    }

    pub fn remove_by_addr(&mut self, addr: &SocketAddr) -> Option<PeerConnection> {
        let peer_id = self.peers_by_addr.remove(addr)?;
        self.peers.remove(&peer_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerConnection> {
        self.peers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PeerConnection> {
        self.peers.values_mut()
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    pub fn cleanup_timed_out(&mut self) -> Vec<PeerId> {
        let timed_out: Vec<PeerId> = self
            .peers
            .values()
            .filter(|peer| peer.is_timed_out(self.timeout))
            .map(|peer| peer.peer_id)
            .collect();

        for peer_id in &timed_out {
            self.remove(*peer_id);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_admit_assigns_ids_in_order() {
        let mut connections = ConnectionManager::new(4);

        let first = connections.admit(addr(5000), 1).unwrap();
        assert_eq!(first.peer.peer_id, PeerId(1));
        assert!(first.is_new);

        let second = connections.admit(addr(5001), 2).unwrap();
        assert_eq!(second.peer.peer_id, PeerId(2));

        let again = connections.admit(addr(5000), 1).unwrap();
        assert_eq!(again.peer.peer_id, PeerId(1));
        assert!(!again.is_new);
        assert_eq!(again.replaced, None);

        assert_eq!(connections.peer_ids(), vec![PeerId(1), PeerId(2)]);
    }

    #[test]
    fn test_admit_rejects_when_full() {
        let mut connections = ConnectionManager::new(1);
        connections.admit(addr(5000), 1).unwrap();

        assert_eq!(
            connections.admit(addr(5001), 2).map(|a| a.peer.peer_id),
            Err(AdmitError::Full)
        );
    }

    #[test]
    fn test_new_salt_replaces_stale_session() {
        let mut connections = ConnectionManager::new(4);
        connections.admit(addr(5000), 1).unwrap();

        let admission = connections.admit(addr(5000), 99).unwrap();
        assert_eq!(admission.peer.peer_id, PeerId(2));
        assert!(admission.is_new);
        assert_eq!(admission.replaced, Some(PeerId(1)));
        assert_eq!(connections.peer_ids(), vec![PeerId(2)]);
    }

    #[test]
    fn test_cleanup_timed_out() {
        let mut connections = ConnectionManager::with_timeout(4, Duration::ZERO);
        connections.admit(addr(5000), 1).unwrap();
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(connections.cleanup_timed_out(), vec![PeerId(1)]);
        assert!(connections.is_empty());
    }
}
