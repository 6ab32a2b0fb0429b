use super::movement;
use crate::player::MovementConfig;
use crate::world::World;

pub struct FixedTimestep {
    tick_rate: u32,
    dt: f32,
    accumulator: f32,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn accumulate(&mut self, delta: f32) {
        self.accumulator += delta.min(0.25);
    }

    pub fn should_tick(&self) -> bool {
        self.accumulator >= self.dt
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }
}

/// Authoritative world advanced at a fixed rate.
pub struct Simulation {
    pub world: World,
    pub movement: MovementConfig,
    timestep: FixedTimestep,
}

impl Simulation {
    pub fn new(tick_rate: u32, movement: MovementConfig) -> Self {
        Self {
            world: World::new(),
            movement,
            timestep: FixedTimestep::new(tick_rate),
        }
    }

    pub fn tick(&self) -> u32 {
        self.world.tick()
    }

    pub fn dt(&self) -> f32 {
        self.timestep.dt()
    }

    pub fn step(&mut self) {
        movement::step_players(&mut self.world, &self.movement, self.timestep.dt());
    }

    /// Runs as many fixed steps as `delta` covers and returns how many ran.
    pub fn update(&mut self, delta: f32) -> u32 {
        self.update_with(delta, |_| {})
    }

    /// Like `update`, calling `before_step` ahead of every step so callers
    /// can feed inputs for that step.
    pub fn update_with<F>(&mut self, delta: f32, mut before_step: F) -> u32
    where
        F: FnMut(&mut World),
    {
        self.timestep.accumulate(delta);

        let mut ticks_run = 0;
        while self.timestep.consume_tick() {
            before_step(&mut self.world);
            self.step();
            ticks_run += 1;
        }
        ticks_run
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    #[test]
    fn fixed_timestep_accumulation() {
        let mut ts = FixedTimestep::new(60);

        ts.accumulate(1.0 / 30.0);
        assert!(ts.should_tick());
        assert!(ts.consume_tick());
        assert!(ts.consume_tick());
        assert!(!ts.consume_tick());
    }

    #[test]
    fn fixed_timestep_clamps_long_frames() {
        let mut ts = FixedTimestep::new(8);
        ts.accumulate(10.0);

        let mut ticks = 0;
        while ts.consume_tick() {
            ticks += 1;
        }
        assert_eq!(ticks, 2);
    }

    #[test]
    fn simulation_update_runs_fixed_steps() {
        let mut sim = Simulation::new(60, MovementConfig::default());
        sim.world.spawn_player(0, Vec3::ZERO);

        assert_eq!(sim.update(1.0 / 30.0), 2);
        assert_eq!(sim.tick(), 2);
    }
}
