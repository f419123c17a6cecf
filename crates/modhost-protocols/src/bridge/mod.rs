//! Registration bridge definitions.
//!
//! Bridges are the narrow surface modules use to hand commands and event
//! listeners to the host. Their implementations live outside this crate.

mod command;
mod listener;

pub use command::*;
pub use listener::*;
