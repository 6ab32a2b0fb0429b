mod movement;
mod tick;

pub use movement::{apply_inputs, step_players};
pub use tick::{FixedTimestep, Simulation};
