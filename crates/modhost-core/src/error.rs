//! Error types for module loading and lifecycle management.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use modhost_protocols::ModuleState;

/// Lifecycle hook names, used in error reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PreEnable,
    OnEnable,
    PreDisable,
    OnDisable,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookKind::PreEnable => "pre_enable",
            HookKind::OnEnable => "on_enable",
            HookKind::PreDisable => "pre_disable",
            HookKind::OnDisable => "on_disable",
        };
        f.write_str(name)
    }
}

/// Errors raised while loading or transitioning modules.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Malformed module metadata; the unit is skipped.
    #[error("Invalid module descriptor {}: {reason}", path.display())]
    DescriptorParse { path: PathBuf, reason: String },

    /// The entry could not be constructed; the unit is skipped.
    #[error("Failed to instantiate module {id}: {reason}")]
    Instantiation { id: String, reason: String },

    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// A module hook returned an error or panicked.
    #[error("Module {id} failed in {hook}: {reason}")]
    LifecycleHook {
        id: String,
        hook: HookKind,
        reason: String,
    },

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Cannot {operation} module {id} while it is {state}")]
    InvalidTransition {
        id: String,
        state: ModuleState,
        operation: &'static str,
    },

    #[error("Module {module} requires {dependency}, which is not available")]
    MissingDependency { module: String, dependency: String },

    #[error("Module {0} cannot be enabled without a connection")]
    NotConnected(String),
}

impl LifecycleError {
    /// Id of the module the error concerns, if any.
    pub fn module_id(&self) -> Option<&str> {
        match self {
            LifecycleError::DescriptorParse { .. } | LifecycleError::CircularDependency { .. } => {
                None
            }
            LifecycleError::Instantiation { id, .. }
            | LifecycleError::LifecycleHook { id, .. }
            | LifecycleError::InvalidTransition { id, .. } => Some(id),
            LifecycleError::UnknownModule(id) | LifecycleError::NotConnected(id) => Some(id),
            LifecycleError::MissingDependency { module, .. } => Some(module),
        }
    }
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors raised when dispatching a registered command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid arguments for {command}: {reason}")]
    InvalidArguments { command: String, reason: String },

    #[error("Command {command} failed: {reason}")]
    Failed { command: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_display() {
        assert_eq!(HookKind::PreEnable.to_string(), "pre_enable");
        assert_eq!(HookKind::OnDisable.to_string(), "on_disable");
    }

    #[test]
    fn test_circular_dependency_display() {
        let err = LifecycleError::CircularDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
        assert!(err.module_id().is_none());
    }

    #[test]
    fn test_lifecycle_hook_display() {
        let err = LifecycleError::LifecycleHook {
            id: "greeter".into(),
            hook: HookKind::OnEnable,
            reason: "boom".into(),
        };
        assert_eq!(err.to_string(), "Module greeter failed in on_enable: boom");
        assert_eq!(err.module_id(), Some("greeter"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = LifecycleError::InvalidTransition {
            id: "m".into(),
            state: ModuleState::Enabled,
            operation: "enable",
        };
        assert_eq!(err.to_string(), "Cannot enable module m while it is ENABLED");
    }

    #[test]
    fn test_descriptor_parse_display() {
        let err = LifecycleError::DescriptorParse {
            path: PathBuf::from("/mods/x/module.toml"),
            reason: "missing field `id`".into(),
        };
        assert!(err.to_string().contains("/mods/x/module.toml"));
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn test_command_error_display() {
        let err = CommandError::UnknownCommand("ping".into());
        assert_eq!(err.to_string(), "Unknown command: ping");
    }
}
