//! # modhost Protocols
//!
//! Core protocol definitions (traits) for the modhost runtime.
//! Contains only interface definitions and shared data types.
//!
//! ## Core Traits
//!
//! - [`Module`] - Lifecycle hooks implemented by every loadable unit
//! - [`TaskScheduler`] - Tick-driven scheduler contract used by modules
//! - [`CommandRegistryAccess`] / [`ListenerRegistryAccess`] - Registration bridges
//! - [`PreludeHandle`] / [`ConnectionHandle`] - Opaque host handles injected during activation

pub mod bridge;
pub mod error;
pub mod module;
pub mod scheduler;

// Re-export core traits
pub use bridge::{
    ArgumentKind, CommandArgument, CommandHandler, CommandRegistryAccess, CommandSpec,
    EventListener, ListenerRegistryAccess,
};
pub use error::{panic_message, ModuleError};
pub use module::{
    ConnectionHandle, Module, ModuleContext, ModuleDescriptor, ModuleState, PreludeHandle,
};
pub use scheduler::{ExecutionLane, ModuleScheduler, ScheduledTask, TaskId, TaskScheduler, TaskWork};
