//! Virtual tick clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic tick counter advanced by the scheduler driver.
///
/// Readable from any thread; only the scheduler advances it.
#[derive(Debug)]
pub struct TickClock {
    current: AtomicU64,
    tick_rate: Duration,
}

impl TickClock {
    pub fn new(tick_rate: Duration) -> Self {
        Self {
            current: AtomicU64::new(0),
            tick_rate,
        }
    }

    /// Current tick.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Real-time length of one tick.
    pub fn tick_rate(&self) -> Duration {
        self.tick_rate
    }

    /// Real time covered by `ticks` ticks.
    pub fn ticks_to_duration(&self, ticks: u64) -> Duration {
        self.tick_rate.saturating_mul(ticks.min(u32::MAX as u64) as u32)
    }

    /// Advance by one tick, returning the new value.
    pub(crate) fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }
}
