mod config;
mod input;

pub use config::MovementConfig;
pub use input::{MovementButton, PlayerInputs, yaw_axes};
