//! Registries for module factories, commands and listeners.

mod command;
mod factory;
mod listener;

pub use command::{CommandBridge, CommandRegistry};
pub use factory::{FnModuleFactory, ModuleFactory, ModuleFactoryRegistry};
pub use listener::ListenerBridge;
