//! Module lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleState {
    /// Instantiated, not yet activated.
    Discovered,
    /// `pre_enable` succeeded, waiting for the connection.
    PendingEnable,
    /// Fully active.
    Enabled,
    /// `pre_disable` has been called.
    PendingDisable,
    /// `on_disable` has been called.
    Disabled,
    /// Unrecovered fault; the instance has been unloaded.
    Invalid,
}

impl ModuleState {
    /// Whether the module is between two stable states.
    pub fn is_transitional(&self) -> bool {
        matches!(self, ModuleState::PendingEnable | ModuleState::PendingDisable)
    }

    /// Whether the module currently has a live, activated instance.
    pub fn is_active(&self) -> bool {
        matches!(self, ModuleState::PendingEnable | ModuleState::Enabled)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleState::Discovered => "DISCOVERED",
            ModuleState::PendingEnable => "PENDING_ENABLE",
            ModuleState::Enabled => "ENABLED",
            ModuleState::PendingDisable => "PENDING_DISABLE",
            ModuleState::Disabled => "DISABLED",
            ModuleState::Invalid => "INVALID",
        };
        f.write_str(name)
    }
}
