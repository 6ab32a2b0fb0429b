use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use glam::{Quat, Vec3};

use netsync::net::{NetworkStats, UdpServerTransport};
use netsync::session::SlotChange;
use netsync::{EntityId, EntityStore, MessageTag, PeerId, Roster, ServerSession, Transform};

use crate::config::ServerConfig;
use crate::events::ServerEvent;

const PROP_ORBIT_RADIUS: f32 = 6.0;
const PROP_ORBIT_SPEED: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchState {
    Waiting,
    Running { started: Instant },
    Finished,
}

pub struct ServerStats {
    pub tick: u32,
    pub peers: usize,
    pub entities: usize,
    pub scheduler_passes: u64,
    pub network: NetworkStats,
}

pub struct GameServer {
    session: ServerSession<UdpServerTransport>,
    config: ServerConfig,
    roster: Roster,
    props: Vec<EntityId>,
    match_state: MatchState,
    running: Arc<AtomicBool>,
    start_time: Instant,
    last_tick_time: Instant,
    last_stats_time: Instant,
    pending_events: VecDeque<ServerEvent>,
}

impl GameServer {
    pub fn new(bind_addr: &str, config: ServerConfig) -> anyhow::Result<Self> {
        let mut transport = UdpServerTransport::bind(bind_addr, config.max_clients, config.timeout)?;
        if let Some(sim) = config.packet_loss.clone() {
            log::info!("Simulating {:.1}% outbound loss", sim.loss_percent);
            transport.set_packet_loss(sim);
        }

        let session = ServerSession::new(transport, config.session.clone());
        let props = spawn_props(&session, config.props);

        let now = Instant::now();
        Ok(Self {
            session,
            roster: Roster::new(),
            props,
            match_state: MatchState::Waiting,
            running: Arc::new(AtomicBool::new(true)),
            start_time: now,
            last_tick_time: now,
            last_stats_time: now,
            pending_events: VecDeque::new(),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.session.transport().local_addr()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            for event in self.drain_events() {
                event.log();
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.shutdown();
    }

    pub fn shutdown(&mut self) {
        if matches!(self.match_state, MatchState::Running { .. }) {
            self.end_match();
        }
        self.session.transport_mut().shutdown();
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        let delta = (now - self.last_tick_time).as_secs_f32();
        self.last_tick_time = now;

        self.animate_props();

        if let Err(e) = self.session.update(delta) {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("Network error: {}", e),
            });
        }

        self.track_roster();
        self.update_match(now);

        if now - self.last_stats_time >= self.config.stats_interval {
            self.last_stats_time = now;
            let stats = self.stats();
            log::info!(
                "tick {} | peers {} | entities {} | passes {} | sent {} ({} B) | recv {} | dropped {}",
                stats.tick,
                stats.peers,
                stats.entities,
                stats.scheduler_passes,
                stats.network.packets_sent,
                stats.network.bytes_sent,
                stats.network.packets_received,
                stats.network.packets_dropped_simulated,
            );
        }
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.session.tick(),
            peers: self.roster.occupied().filter(|(_, p)| *p != PeerId::LOCAL).count(),
            entities: self.session.world().entity_count(),
            scheduler_passes: self.session.scheduler().passes(),
            network: self.session.transport().stats().clone(),
        }
    }

    fn track_roster(&mut self) {
        let current = self.session.roster();
        for change in self.roster.changes_to(&current) {
            let event = match change {
                SlotChange::Joined { slot, peer } if peer != PeerId::LOCAL => {
                    ServerEvent::PeerJoined { peer, slot }
                }
                SlotChange::Left { slot, peer } if peer != PeerId::LOCAL => {
                    ServerEvent::PeerLeft { peer, slot }
                }
                _ => continue,
            };
            self.pending_events.push_back(event);
        }
        self.roster = current;
    }

    fn update_match(&mut self, now: Instant) {
        match self.match_state {
            MatchState::Waiting if self.roster.occupied_count() > 1 => {
                let length = self.config.match_duration.map_or(0, |d| d.as_secs() as u32);
                self.broadcast(MessageTag::GameStart, length.to_le_bytes().to_vec());
                self.match_state = MatchState::Running { started: now };
                self.pending_events.push_back(ServerEvent::MatchStarted);
            }
            MatchState::Running { started } => {
                if self
                    .config
                    .match_duration
                    .is_some_and(|length| now - started >= length)
                {
                    self.end_match();
                    self.running.store(false, Ordering::SeqCst);
                }
            }
            _ => {}
        }
    }

    fn end_match(&mut self) {
        self.broadcast(MessageTag::GameEnd, Vec::new());
        self.match_state = MatchState::Finished;
        self.pending_events.push_back(ServerEvent::MatchEnded);
    }

    fn broadcast(&mut self, tag: MessageTag, payload: Vec<u8>) {
        if let Err(e) = self.session.broadcast_app(tag, payload) {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("Failed to broadcast {:?}: {}", tag, e),
            });
        }
    }

    fn animate_props(&mut self) {
        let t = self.start_time.elapsed().as_secs_f32() * PROP_ORBIT_SPEED;
        let count = self.props.len().max(1) as f32;
        let mut world = self.session.world_mut();

        for (i, id) in self.props.iter().enumerate() {
            let angle = t + i as f32 * std::f32::consts::TAU / count;
            let position = Vec3::new(angle.cos(), 0.0, angle.sin()) * PROP_ORBIT_RADIUS + Vec3::Y;
            world.set_transform(*id, Transform::new(position, Quat::from_rotation_y(-angle)));
        }
    }
}

fn spawn_props(session: &ServerSession<UdpServerTransport>, count: usize) -> Vec<EntityId> {
    let mut world = session.world_mut();
    (0..count)
        .map(|_| world.spawn_prop(Transform::from_position(Vec3::Y)))
        .collect()
}
