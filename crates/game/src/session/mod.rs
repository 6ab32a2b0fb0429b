mod client;
mod config;
mod input;
mod roster;
mod server;

pub use client::ClientSession;
pub use config::SessionConfig;
pub use input::{accept_input, outgoing_input};
pub use roster::{Roster, SlotChange};
pub use server::ServerSession;
