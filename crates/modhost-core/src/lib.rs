//! # modhost Core
//!
//! Module loading and lifecycle management for the modhost runtime.
//!
//! ## Components
//!
//! - [`ModuleLoader`] - Discovers module descriptors and instantiates modules
//! - [`DependencyGraph`] - Deterministic dependency ordering with cycle detection
//! - [`ModuleManager`] - Drives modules through their lifecycle states
//! - Registries for module factories, commands and listeners

pub mod dependency;
pub mod error;
pub mod loader;
pub mod manager;
pub mod record;
pub mod registry;

pub use dependency::{DependencyGraph, Resolution};
pub use error::{CommandError, HookKind, LifecycleError, LifecycleResult};
pub use loader::{DiscoveredModule, Discovery, LoadContext, ModuleLoader};
pub use manager::{BatchReport, LoadReport, ModuleManager};
pub use record::ModuleSnapshot;
pub use registry::{
    CommandBridge, CommandRegistry, FnModuleFactory, ListenerBridge, ModuleFactory,
    ModuleFactoryRegistry,
};
