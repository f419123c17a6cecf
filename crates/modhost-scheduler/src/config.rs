//! Configuration for the scheduler.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Length of one tick in milliseconds.
    #[serde(default = "default_tick_rate_ms")]
    pub tick_rate_ms: u64,
}

/// 20 ticks per second.
fn default_tick_rate_ms() -> u64 {
    50
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_rate_ms: default_tick_rate_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with the given tick length.
    pub fn with_tick_rate(tick_rate: Duration) -> Self {
        Self {
            tick_rate_ms: (tick_rate.as_millis() as u64).max(1),
        }
    }

    /// Tick length as Duration.
    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms.max(1))
    }
}
