use std::time::Duration;

use crate::net::DEFAULT_SNAPSHOT_RATE;

#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Delta passes between two full passes.
    pub full_frame_interval: i32,
    pub max_history: usize,
    pub snapshot_rate: u32,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            full_frame_interval: 5,
            max_history: 64,
            snapshot_rate: DEFAULT_SNAPSHOT_RATE,
        }
    }
}

impl ReplicationConfig {
    pub fn snapshot_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.snapshot_rate.max(1)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Delta,
    Full,
}

impl PassKind {
    pub fn wants_delta(self) -> bool {
        self == PassKind::Delta
    }
}

/// Countdown deciding whether a snapshot pass sends deltas or full frames.
#[derive(Debug, Clone)]
pub struct SnapshotScheduler {
    counter: i32,
    reset_value: i32,
    passes: u64,
}

impl SnapshotScheduler {
    pub fn new(full_frame_interval: i32) -> Self {
        let reset_value = full_frame_interval.max(0);
        Self {
            counter: reset_value,
            reset_value,
            passes: 0,
        }
    }

    pub fn counter(&self) -> i32 {
        self.counter
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn next_pass(&mut self) -> PassKind {
        self.passes += 1;
        self.counter -= 1;
        if self.counter < 0 {
            self.counter = self.reset_value;
            PassKind::Full
        } else {
            PassKind::Delta
        }
    }

    /// Makes the next pass a full one, e.g. after a peer joins.
    pub fn force_full(&mut self) {
        self.counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_pass_every_sixth_tick() {
        let mut scheduler = SnapshotScheduler::new(5);
        let passes: Vec<_> = (0..12).map(|_| scheduler.next_pass()).collect();

        let fulls: Vec<_> = passes
            .iter()
            .enumerate()
            .filter(|(_, kind)| **kind == PassKind::Full)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(fulls, vec![6, 12]);
        assert_eq!(scheduler.counter(), 5);
    }

    #[test]
    fn test_force_full() {
        let mut scheduler = SnapshotScheduler::new(5);
        scheduler.next_pass();
        scheduler.force_full();

        assert_eq!(scheduler.next_pass(), PassKind::Full);
        assert_eq!(scheduler.next_pass(), PassKind::Delta);
    }

    #[test]
    fn test_default_period() {
        let config = ReplicationConfig::default();
        let period = config.snapshot_period().as_secs_f64();
        assert!((period - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_zero_interval_sends_only_fulls() {
        let mut scheduler = SnapshotScheduler::new(0);
        assert!((0..4).all(|_| scheduler.next_pass() == PassKind::Full));
    }
}
