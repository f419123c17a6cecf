//! Host-wide command registry and the per-module bridge into it.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use modhost_protocols::{CommandHandler, CommandRegistryAccess, ModuleError};

use crate::error::CommandError;

struct CommandEntry {
    owner: String,
    handler: Arc<dyn CommandHandler>,
}

/// Commands registered by modules, keyed by command name.
pub struct CommandRegistry {
    commands: DashMap<String, CommandEntry>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: DashMap::new(),
        }
    }

    /// Register a handler on behalf of `owner`.
    pub fn register(&self, owner: &str, handler: Arc<dyn CommandHandler>) -> Result<(), ModuleError> {
        let name = handler.spec().name.clone();
        match self.commands.entry(name.clone()) {
            Entry::Occupied(_) => Err(ModuleError::AlreadyRegistered(name)),
            Entry::Vacant(slot) => {
                slot.insert(CommandEntry {
                    owner: owner.to_string(),
                    handler,
                });
                debug!(module = %owner, "Registered command {}", name);
                Ok(())
            }
        }
    }

    /// Remove every command owned by `owner`. Returns the number removed.
    pub fn unregister_module(&self, owner: &str) -> usize {
        let before = self.commands.len();
        self.commands.retain(|_, entry| entry.owner != owner);
        let removed = before.saturating_sub(self.commands.len());
        if removed > 0 {
            info!(module = %owner, "Unregistered {} command(s)", removed);
        }
        removed
    }

    /// Validate `args` against the command's spec and run its handler.
    pub fn dispatch(&self, name: &str, args: &serde_json::Value) -> Result<serde_json::Value, CommandError> {
        let handler = self
            .commands
            .get(name)
            .map(|entry| entry.handler.clone())
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;

        handler
            .spec()
            .validate(args)
            .map_err(|reason| CommandError::InvalidArguments {
                command: name.to_string(),
                reason,
            })?;

        handler.handle(args).map_err(|e| CommandError::Failed {
            command: name.to_string(),
            reason: format!("{:#}", e),
        })
    }

    /// Owner of a command.
    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.commands.get(name).map(|entry| entry.owner.clone())
    }

    /// Commands owned by `owner`, sorted.
    pub fn commands_for(&self, owner: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .iter()
            .filter(|entry| entry.owner == owner)
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// All command names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Command registration bridge handed to one module.
pub struct CommandBridge {
    owner: String,
    registry: Arc<CommandRegistry>,
}

impl CommandBridge {
    pub fn new(owner: impl Into<String>, registry: Arc<CommandRegistry>) -> Self {
        Self {
            owner: owner.into(),
            registry,
        }
    }
}

impl CommandRegistryAccess for CommandBridge {
    fn register_command_handler(&self, handler: Arc<dyn CommandHandler>) -> Result<(), ModuleError> {
        self.registry.register(&self.owner, handler)
    }

    fn registered_commands(&self) -> Vec<String> {
        self.registry.commands_for(&self.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modhost_protocols::{ArgumentKind, CommandArgument, CommandSpec};
    use serde_json::json;

    struct Echo {
        spec: CommandSpec,
    }

    impl Echo {
        fn new(name: &str) -> Arc<dyn CommandHandler> {
            Arc::new(Self {
                spec: CommandSpec::new(name, "echo the text back")
                    .argument(CommandArgument::required("text", ArgumentKind::String)),
            })
        }
    }

    impl CommandHandler for Echo {
        fn spec(&self) -> &CommandSpec {
            &self.spec
        }

        fn handle(&self, args: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
            match args["text"].as_str() {
                Some("fail") => anyhow::bail!("asked to fail"),
                _ => Ok(args["text"].clone()),
            }
        }
    }

    #[test]
    fn test_register_and_dispatch() {
        let registry = CommandRegistry::new();
        registry.register("m", Echo::new("echo")).unwrap();

        let result = registry.dispatch("echo", &json!({"text": "hi"})).unwrap();
        assert_eq!(result, json!("hi"));
        assert_eq!(registry.owner_of("echo").as_deref(), Some("m"));
    }

    #[test]
    fn test_duplicate_command_rejected() {
        let registry = CommandRegistry::new();
        registry.register("a", Echo::new("echo")).unwrap();
        let err = registry.register("b", Echo::new("echo")).unwrap_err();
        assert!(matches!(err, ModuleError::AlreadyRegistered(name) if name == "echo"));
        assert_eq!(registry.owner_of("echo").as_deref(), Some("a"));
    }

    #[test]
    fn test_dispatch_errors() {
        let registry = CommandRegistry::new();
        registry.register("m", Echo::new("echo")).unwrap();

        assert!(matches!(
            registry.dispatch("missing", &json!({})),
            Err(CommandError::UnknownCommand(_))
        ));
        assert!(matches!(
            registry.dispatch("echo", &json!({"text": 3})),
            Err(CommandError::InvalidArguments { .. })
        ));
        assert!(matches!(
            registry.dispatch("echo", &json!({"text": "fail"})),
            Err(CommandError::Failed { .. })
        ));
    }

    #[test]
    fn test_unregister_module() {
        let registry = Arc::new(CommandRegistry::new());
        let a = CommandBridge::new("a", registry.clone());
        let b = CommandBridge::new("b", registry.clone());
        a.register_command_handler(Echo::new("one")).unwrap();
        a.register_command_handler(Echo::new("two")).unwrap();
        b.register_command_handler(Echo::new("three")).unwrap();

        assert_eq!(a.registered_commands(), vec!["one", "two"]);
        assert_eq!(registry.unregister_module("a"), 2);
        assert!(a.registered_commands().is_empty());
        assert_eq!(registry.list(), vec!["three"]);
        assert_eq!(registry.unregister_module("a"), 0);
    }
}
