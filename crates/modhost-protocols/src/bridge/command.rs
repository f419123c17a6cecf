//! Command registration types.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ModuleError;

/// Value type of a command argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ArgumentKind {
    /// Check whether a JSON value has this kind.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            ArgumentKind::String => value.is_string(),
            ArgumentKind::Integer => value.is_i64() || value.is_u64(),
            ArgumentKind::Number => value.is_number(),
            ArgumentKind::Boolean => value.is_boolean(),
        }
    }
}

/// Declarative description of one command argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandArgument {
    pub name: String,
    pub kind: ArgumentKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl CommandArgument {
    pub fn required(name: impl Into<String>, kind: ArgumentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ArgumentKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Declarative command description: name plus argument specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<CommandArgument>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments: Vec::new(),
        }
    }

    pub fn argument(mut self, argument: CommandArgument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Validate invocation arguments against this spec.
    ///
    /// `args` must be a JSON object (or null when there are no required
    /// arguments). Returns a description of the first violation.
    pub fn validate(&self, args: &serde_json::Value) -> Result<(), String> {
        let empty = serde_json::Map::new();
        let object = match args {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => &empty,
            _ => return Err(format!("arguments for '{}' must be an object", self.name)),
        };

        for argument in &self.arguments {
            match object.get(&argument.name) {
                Some(value) if !argument.kind.accepts(value) => {
                    return Err(format!(
                        "argument '{}' of '{}' must be {:?}",
                        argument.name, self.name, argument.kind
                    ));
                }
                None if argument.required => {
                    return Err(format!(
                        "missing required argument '{}' for '{}'",
                        argument.name, self.name
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Handler invoked when a registered command is executed.
pub trait CommandHandler: Send + Sync {
    /// The command this handler serves.
    fn spec(&self) -> &CommandSpec;

    /// Execute the command with validated arguments.
    fn handle(&self, args: &serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

/// Bridge through which a module registers command handlers.
pub trait CommandRegistryAccess: Send + Sync {
    /// Register a command handler.
    fn register_command_handler(&self, handler: Arc<dyn CommandHandler>) -> Result<(), ModuleError>;

    /// Names of the commands registered through this bridge.
    fn registered_commands(&self) -> Vec<String>;
}
