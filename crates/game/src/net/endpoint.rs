use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use super::connection::{ConnectionManager, ConnectionState};
use super::frame::{MAX_PACKET_SIZE, Packet, PacketHeader, PacketType, SequenceFilter};
use super::stats::{NetworkStats, PacketLossSimulation, rand_u64};
use super::transport::{PeerId, Transport, TransportError, TransportEvent};

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Non-blocking UDP socket speaking rkyv frames.
pub struct NetworkEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    stats: NetworkStats,
    recv_buffer: [u8; MAX_PACKET_SIZE],
    packet_loss: PacketLossSimulation,
}

impl NetworkEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            stats: NetworkStats::default(),
            recv_buffer: [0u8; MAX_PACKET_SIZE],
            packet_loss: PacketLossSimulation::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn set_packet_loss(&mut self, sim: PacketLossSimulation) {
        self.packet_loss = sim;
    }

    pub fn send_to(&mut self, packet: &Packet, addr: SocketAddr) -> Result<usize, TransportError> {
        let data = packet.serialize()?;

        if data.len() > MAX_PACKET_SIZE {
            return Err(TransportError::Oversize {
                size: data.len(),
                limit: MAX_PACKET_SIZE,
            });
        }

        // Only replicated payloads are subject to simulated loss; the handshake is not.
        if matches!(packet.payload, PacketType::Payload(_)) && self.packet_loss.should_drop() {
            self.stats.packets_dropped_simulated += 1;
            return Ok(0);
        }

        let bytes = self.socket.send_to(&data, addr)?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes as u64;

        Ok(bytes)
    }

    pub fn receive(&mut self) -> Result<Vec<(Packet, SocketAddr)>, TransportError> {
        let mut packets = Vec::new();

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => match Packet::deserialize(&self.recv_buffer[..size]) {
                    Ok(packet) => {
                        if !packet.header.is_valid() {
                            continue;
                        }

                        self.stats.packets_received += 1;
                        self.stats.bytes_received += size as u64;
                        packets.push((packet, addr));
                    }
                    Err(e) => {
                        log::debug!("Discarding malformed frame from {}: {}", addr, e);
                    }
                },
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // Windows reports ICMP port unreachable from a previous send here.
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(packets)
    }
}

/// Listening side of the UDP substrate.
pub struct UdpServerTransport {
    endpoint: NetworkEndpoint,
    connections: ConnectionManager,
}

impl UdpServerTransport {
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        max_peers: usize,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            endpoint: NetworkEndpoint::bind(addr)?,
            connections: ConnectionManager::with_timeout(max_peers, timeout),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn stats(&self) -> &NetworkStats {
        self.endpoint.stats()
    }

    pub fn set_packet_loss(&mut self, sim: PacketLossSimulation) {
        self.endpoint.set_packet_loss(sim);
    }

    pub fn kick(&mut self, peer: PeerId) -> bool {
        let Some(mut conn) = self.connections.remove(peer) else {
            return false;
        };
        let packet = Packet::new(
            PacketHeader::new(conn.next_sequence()),
            PacketType::Disconnect,
        );
        if let Err(e) = self.endpoint.send_to(&packet, conn.addr) {
            log::debug!("Failed to notify {} of disconnect: {}", peer, e);
        }
        true
    }

    pub fn shutdown(&mut self) {
        for peer in self.connections.peer_ids() {
            self.kick(peer);
        }
    }

    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr, events: &mut Vec<TransportEvent>) {
        match packet.payload {
            PacketType::ConnectionRequest { client_salt } => {
                match self.connections.admit(addr, client_salt) {
                    Ok(admission) => {
                        let conn = admission.peer;
                        conn.touch();
                        let peer_id = conn.peer_id;
                        let header = PacketHeader::new(conn.next_sequence());
                        let accepted = Packet::new(
                            header,
                            PacketType::ConnectionAccepted {
                                client_salt,
                                peer_id: peer_id.0,
                            },
                        );
                        if let Err(e) = self.endpoint.send_to(&accepted, addr) {
                            log::warn!("Failed to accept {}: {}", addr, e);
                        }
                        if let Some(old) = admission.replaced {
                            log::info!("{} restarted from {}", old, addr);
                            events.push(TransportEvent::Disconnected(old));
                        }
                        if admission.is_new {
                            log::info!("{} connected from {}", peer_id, addr);
                            events.push(TransportEvent::Connected(peer_id));
                        }
                    }
                    Err(e) => {
                        log::warn!("Denied connection from {}: {}", addr, e);
                        let denied = Packet::new(
                            PacketHeader::new(0),
                            PacketType::ConnectionDenied {
                                reason: e.to_string(),
                            },
                        );
                        if let Err(e) = self.endpoint.send_to(&denied, addr) {
                            log::warn!("Failed to deny {}: {}", addr, e);
                        }
                    }
                }
            }
            PacketType::Payload(payload) => {
                let Some(conn) = self.connections.get_by_addr_mut(&addr) else {
                    log::debug!("Payload from unknown address {}", addr);
                    return;
                };
                conn.touch();
                if conn.receive_filter.accept(packet.header.sequence) {
                    events.push(TransportEvent::Message {
                        sender: conn.peer_id,
                        payload,
                    });
                } else {
                    self.endpoint.stats.packets_out_of_order += 1;
                }
            }
            PacketType::Disconnect => {
                if let Some(conn) = self.connections.remove_by_addr(&addr) {
                    log::info!("{} disconnected", conn.peer_id);
                    events.push(TransportEvent::Disconnected(conn.peer_id));
                }
            }
            PacketType::ConnectionAccepted { .. } | PacketType::ConnectionDenied { .. } => {}
        }
    }
}

impl Transport for UdpServerTransport {
    fn poll(&mut self) -> Result<Vec<TransportEvent>, TransportError> {
        let mut events = Vec::new();

        for (packet, addr) in self.endpoint.receive()? {
            self.handle_packet(packet, addr, &mut events);
        }

        for peer in self.connections.cleanup_timed_out() {
            log::info!("{} timed out", peer);
            events.push(TransportEvent::Disconnected(peer));
        }

        Ok(events)
    }

    fn send_to(&mut self, peer: PeerId, payload: &[u8]) -> Result<(), TransportError> {
        let conn = self
            .connections
            .get_mut(peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        let packet = Packet::new(
            PacketHeader::new(conn.next_sequence()),
            PacketType::Payload(payload.to_vec()),
        );
        let addr = conn.addr;
        self.endpoint.send_to(&packet, addr)?;
        Ok(())
    }

    fn broadcast(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        for peer in self.connections.peer_ids() {
            self.send_to(peer, payload)?;
        }
        Ok(())
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.connections.peer_ids()
    }

    fn local_id(&self) -> Option<PeerId> {
        Some(PeerId::SERVER)
    }
}

/// Connecting side of the UDP substrate; talks to exactly one server.
pub struct UdpClientTransport {
    endpoint: NetworkEndpoint,
    server_addr: SocketAddr,
    state: ConnectionState,
    client_salt: u64,
    peer_id: Option<PeerId>,
    send_sequence: u32,
    receive_filter: SequenceFilter,
    last_request: Option<Instant>,
    last_receive_time: Instant,
    timeout: Duration,
}

impl UdpClientTransport {
    pub fn connect(server_addr: SocketAddr, timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = NetworkEndpoint::bind("0.0.0.0:0")?;
        log::info!("Connecting to {} from {}", server_addr, endpoint.local_addr());

        let mut transport = Self {
            endpoint,
            server_addr,
            state: ConnectionState::Connecting,
            client_salt: rand_u64(),
            peer_id: None,
            send_sequence: 0,
            receive_filter: SequenceFilter::new(),
            last_request: None,
            last_receive_time: Instant::now(),
            timeout,
        };
        transport.send_connection_request()?;
        Ok(transport)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn stats(&self) -> &NetworkStats {
        self.endpoint.stats()
    }

    pub fn set_packet_loss(&mut self, sim: PacketLossSimulation) {
        self.endpoint.set_packet_loss(sim);
    }

    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Connected {
            let packet = Packet::new(PacketHeader::new(self.next_sequence()), PacketType::Disconnect);
            let _ = self.endpoint.send_to(&packet, self.server_addr);
        }
        self.state = ConnectionState::Disconnected;
        self.peer_id = None;
    }

    fn next_sequence(&mut self) -> u32 {
        let sequence = self.send_sequence;
        self.send_sequence = self.send_sequence.wrapping_add(1);
        sequence
    }

    fn send_connection_request(&mut self) -> Result<(), TransportError> {
        let packet = Packet::new(
            PacketHeader::new(self.next_sequence()),
            PacketType::ConnectionRequest {
                client_salt: self.client_salt,
            },
        );
        self.endpoint.send_to(&packet, self.server_addr)?;
        self.last_request = Some(Instant::now());
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet, events: &mut Vec<TransportEvent>) {
        match packet.payload {
            PacketType::ConnectionAccepted {
                client_salt,
                peer_id,
            } => {
                if self.state == ConnectionState::Connecting && client_salt == self.client_salt {
                    self.receive_filter.accept(packet.header.sequence);
                    self.state = ConnectionState::Connected;
                    self.peer_id = Some(PeerId(peer_id));
                    log::info!("Connected to {} as {}", self.server_addr, PeerId(peer_id));
                    events.push(TransportEvent::Connected(PeerId::SERVER));
                }
            }
            PacketType::ConnectionDenied { reason } => {
                if self.state == ConnectionState::Connecting {
                    log::warn!("Connection denied: {}", reason);
                    self.state = ConnectionState::Disconnected;
                    events.push(TransportEvent::Disconnected(PeerId::SERVER));
                }
            }
            PacketType::Payload(payload) => {
                if self.state != ConnectionState::Connected {
                    return;
                }
                if self.receive_filter.accept(packet.header.sequence) {
                    events.push(TransportEvent::Message {
                        sender: PeerId::SERVER,
                        payload,
                    });
                } else {
                    self.endpoint.stats.packets_out_of_order += 1;
                }
            }
            PacketType::Disconnect => {
                if self.state == ConnectionState::Connected {
                    log::info!("Server closed the connection");
                    self.state = ConnectionState::Disconnected;
                    self.peer_id = None;
                    events.push(TransportEvent::Disconnected(PeerId::SERVER));
                }
            }
            PacketType::ConnectionRequest { .. } => {}
        }
    }
}

impl Transport for UdpClientTransport {
    fn poll(&mut self) -> Result<Vec<TransportEvent>, TransportError> {
        let mut events = Vec::new();

        if self.state == ConnectionState::Connecting
            && self
                .last_request
                .is_none_or(|sent| sent.elapsed() >= CONNECT_RETRY_INTERVAL)
        {
            self.send_connection_request()?;
        }

        for (packet, addr) in self.endpoint.receive()? {
            if addr != self.server_addr {
                continue;
            }
            self.last_receive_time = Instant::now();
            self.handle_packet(packet, &mut events);
        }

        if self.state == ConnectionState::Connected && self.last_receive_time.elapsed() > self.timeout {
            log::warn!("Connection to {} timed out", self.server_addr);
            self.state = ConnectionState::Disconnected;
            self.peer_id = None;
            events.push(TransportEvent::Disconnected(PeerId::SERVER));
        }

        Ok(events)
    }

    fn send_to(&mut self, peer: PeerId, payload: &[u8]) -> Result<(), TransportError> {
        if peer != PeerId::SERVER {
            return Err(TransportError::UnknownPeer(peer));
        }
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let packet = Packet::new(
            PacketHeader::new(self.next_sequence()),
            PacketType::Payload(payload.to_vec()),
        );
        self.endpoint.send_to(&packet, self.server_addr)?;
        Ok(())
    }

    fn broadcast(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.send_to(PeerId::SERVER, payload)
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        if self.state == ConnectionState::Connected {
            vec![PeerId::SERVER]
        } else {
            Vec::new()
        }
    }

    fn local_id(&self) -> Option<PeerId> {
        self.peer_id
    }
}
