use std::collections::VecDeque;
use std::time::Instant;

const SAMPLE_COUNT: usize = 60;

/// Rolling frame rate and accepted-snapshot rate.
pub struct ClientStats {
    frame_times: VecDeque<f32>,
    snapshot_samples: VecDeque<(Instant, u64)>,
    fps: f32,
    snapshot_rate: f32,
}

impl Default for ClientStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientStats {
    pub fn new() -> Self {
        Self {
            frame_times: VecDeque::with_capacity(SAMPLE_COUNT),
            snapshot_samples: VecDeque::with_capacity(SAMPLE_COUNT),
            fps: 0.0,
            snapshot_rate: 0.0,
        }
    }

    pub fn record_frame(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        if self.frame_times.len() >= SAMPLE_COUNT {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(dt);

        let avg_dt: f32 = self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32;
        self.fps = 1.0 / avg_dt;
    }

    /// `accepted` is the running total of accepted snapshot messages.
    pub fn record_snapshots(&mut self, now: Instant, accepted: u64) {
        if self.snapshot_samples.len() >= SAMPLE_COUNT {
            self.snapshot_samples.pop_front();
        }
        self.snapshot_samples.push_back((now, accepted));

        if let (Some((first_time, first)), Some((last_time, last))) =
            (self.snapshot_samples.front(), self.snapshot_samples.back())
        {
            let elapsed = last_time.duration_since(*first_time).as_secs_f32();
            if elapsed > 0.0 {
                self.snapshot_rate = last.saturating_sub(*first) as f32 / elapsed;
            }
        }
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn snapshot_rate(&self) -> f32 {
        self.snapshot_rate
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn snapshot_rate_over_window() {
        let mut stats = ClientStats::new();
        let start = Instant::now();

        stats.record_snapshots(start, 0);
        stats.record_snapshots(start + Duration::from_secs(2), 40);

        assert!((stats.snapshot_rate() - 20.0).abs() < 1e-3);
    }

    #[test]
    fn fps_ignores_empty_frames() {
        let mut stats = ClientStats::new();
        stats.record_frame(0.0);
        assert_eq!(stats.fps(), 0.0);

        stats.record_frame(0.5);
        assert!((stats.fps() - 2.0).abs() < 1e-3);
    }
}
