use std::f32::consts::FRAC_PI_2;

use clap::ValueEnum;

use netsync::{MovementButton, PlayerInputs};

const TURN_RATE: f32 = 0.8;
const LEG_SECONDS: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BotPattern {
    /// Stand still.
    Idle,
    /// Walk straight ahead.
    Forward,
    /// Walk while turning at a constant rate.
    Circle,
    /// Walk a square, turning 90 degrees every leg.
    Square,
    /// Sprint left and right alternately.
    Strafe,
}

/// Scripted stand-in for a human player.
pub struct InputBot {
    pattern: BotPattern,
    elapsed: f32,
}

impl InputBot {
    pub fn new(pattern: BotPattern) -> Self {
        Self {
            pattern,
            elapsed: 0.0,
        }
    }

    pub fn pattern(&self) -> BotPattern {
        self.pattern
    }

    pub fn sample(&mut self, dt: f32) -> PlayerInputs {
        self.elapsed += dt;
        let mut inputs = PlayerInputs::default();
        let leg = (self.elapsed / LEG_SECONDS).floor();

        match self.pattern {
            BotPattern::Idle => {}
            BotPattern::Forward => {
                inputs.set_pressed(MovementButton::Forward, true);
            }
            BotPattern::Circle => {
                inputs.set_pressed(MovementButton::Forward, true);
                inputs.camera_yaw = self.elapsed * TURN_RATE;
            }
            BotPattern::Square => {
                inputs.set_pressed(MovementButton::Forward, true);
                inputs.camera_yaw = leg * FRAC_PI_2;
            }
            BotPattern::Strafe => {
                let button = if leg as u32 % 2 == 0 {
                    MovementButton::Left
                } else {
                    MovementButton::Right
                };
                inputs.set_pressed(button, true);
                inputs.sprint = true;
            }
        }

        inputs
    }
}
