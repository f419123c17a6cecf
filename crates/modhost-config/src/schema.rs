//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::loader::ConfigLoader;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub modules: ModulesConfig,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Module discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Discovery root; each immediate subdirectory is one module.
    #[serde(default = "default_modules_directory")]
    pub directory: String,

    /// Name of the per-module metadata file.
    #[serde(default = "default_descriptor_file")]
    pub descriptor_file: String,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            directory: default_modules_directory(),
            descriptor_file: default_descriptor_file(),
        }
    }
}

impl ModulesConfig {
    /// Discovery root with `~` expanded.
    pub fn directory_path(&self) -> PathBuf {
        ConfigLoader::expand_path(&self.directory)
    }
}

fn default_modules_directory() -> String {
    "modules".to_string()
}

fn default_descriptor_file() -> String {
    "module.toml".to_string()
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Length of one tick in milliseconds.
    #[serde(default = "default_tick_rate_ms")]
    pub tick_rate_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_rate_ms: default_tick_rate_ms(),
        }
    }
}

impl SchedulerSettings {
    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms)
    }
}

/// 20 ticks per second.
fn default_tick_rate_ms() -> u64 {
    50
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files. Empty disables file logging.
    #[serde(default)]
    pub directory: Option<String>,

    /// Emit JSON lines instead of text to the log file.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Resolved log directory, or `None` when file logging is disabled.
    pub fn directory_path(&self) -> Option<PathBuf> {
        match self.directory.as_deref() {
            Some("") => None,
            Some(dir) => Some(ConfigLoader::expand_path(dir)),
            None => default_log_directory(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".modhost").join("logs"))
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
