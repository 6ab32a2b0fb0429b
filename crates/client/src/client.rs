use std::time::{Duration, Instant};

use netsync::net::{AppMessage, ConnectionState, UdpClientTransport};
use netsync::{ClientSession, EntityId, MessageTag};

use crate::bot::InputBot;
use crate::config::ClientConfig;
use crate::stats::ClientStats;

pub struct GameClient {
    session: ClientSession<UdpClientTransport>,
    bot: InputBot,
    stats: ClientStats,
    config: ClientConfig,
    started: Instant,
    last_frame_time: Instant,
    last_status_time: Instant,
    match_over: bool,
}

impl GameClient {
    pub fn connect(config: ClientConfig) -> anyhow::Result<Self> {
        let mut transport = UdpClientTransport::connect(config.server_addr, config.connection_timeout)?;
        if let Some(sim) = config.packet_loss.clone() {
            log::info!("Simulating {:.1}% outbound loss", sim.loss_percent);
            transport.set_packet_loss(sim);
        }

        let now = Instant::now();
        Ok(Self {
            session: ClientSession::new(transport, &config.session),
            bot: InputBot::new(config.pattern),
            stats: ClientStats::new(),
            started: now,
            last_frame_time: now,
            last_status_time: now,
            match_over: false,
            config,
        })
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        log::info!("Running {:?} bot", self.bot.pattern());

        while !self.finished() {
            self.frame()?;
            std::thread::sleep(Duration::from_millis(1));
        }

        self.session.transport_mut().disconnect();
        let diagnostics = self.session.diagnostics();
        log::info!(
            "Done: {} fulls, {} deltas accepted; {} stale, {} orphaned",
            diagnostics.fulls_accepted,
            diagnostics.deltas_accepted,
            diagnostics.stale_full,
            diagnostics.orphaned_delta
        );
        Ok(())
    }

    fn finished(&self) -> bool {
        if self.match_over {
            return true;
        }
        if self
            .config
            .duration
            .is_some_and(|limit| self.started.elapsed() >= limit)
        {
            return true;
        }
        self.session.transport().state() == ConnectionState::Disconnected
    }

    fn frame(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let delta = (now - self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        let inputs = self.bot.sample(delta);
        self.session.update(delta, inputs)?;

        for message in self.session.drain_app_messages() {
            self.handle_app_message(message);
        }

        let diagnostics = self.session.diagnostics();
        self.stats.record_frame(delta);
        self.stats
            .record_snapshots(now, diagnostics.fulls_accepted + diagnostics.deltas_accepted);

        if now - self.last_status_time >= self.config.status_interval {
            self.last_status_time = now;
            self.log_status();
        }
        Ok(())
    }

    fn handle_app_message(&mut self, message: AppMessage) {
        match message.tag {
            MessageTag::GameStart => {
                let seconds = message
                    .payload
                    .first_chunk::<4>()
                    .map_or(0, |bytes| u32::from_le_bytes(*bytes));
                if seconds > 0 {
                    log::info!("Match started ({}s)", seconds);
                } else {
                    log::info!("Match started");
                }
            }
            MessageTag::GameEnd => {
                log::info!("Match ended");
                self.match_over = true;
            }
            other => {
                log::debug!("Ignoring {:?} ({} bytes)", other, message.payload.len());
            }
        }
    }

    fn log_status(&self) {
        let Some(slot) = self.session.player_slot() else {
            log::info!("Waiting for a player slot");
            return;
        };

        let world = self.session.world();
        let position = world
            .get_entity(slot as EntityId)
            .map(|entity| entity.position());
        let network = self.session.transport().stats();
        log::info!(
            "player {} at {:?} | entities {} | version {} | {:.1} snapshots/s | {:.0} fps | recv {} | out of order {}",
            slot,
            position,
            world.entity_count(),
            self.session.last_accepted_version(),
            self.stats.snapshot_rate(),
            self.stats.fps(),
            network.packets_received,
            network.packets_out_of_order,
        );
    }
}
