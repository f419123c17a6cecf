//! Scheduled task record.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique, monotonically assigned task identifier.
pub type TaskId = u64;

/// Zero-argument work executed by the scheduler.
///
/// Repeating tasks invoke the same closure once per period.
pub type TaskWork = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Execution context a task runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionLane {
    /// Inline on the driver.
    Sync,
    /// On the worker pool.
    Async,
}

/// A task owned by the scheduler's task table.
///
/// `cancelled` is the only field that changes after creation.
pub struct ScheduledTask {
    id: TaskId,
    owner: String,
    work: TaskWork,
    lane: ExecutionLane,
    next_run_tick: u64,
    period_ticks: u64,
    cancelled: AtomicBool,
    created_at: DateTime<Utc>,
}

impl ScheduledTask {
    /// Create a new task record.
    pub fn new(
        id: TaskId,
        owner: impl Into<String>,
        work: TaskWork,
        lane: ExecutionLane,
        next_run_tick: u64,
        period_ticks: u64,
    ) -> Self {
        Self {
            id,
            owner: owner.into(),
            work,
            lane,
            next_run_tick,
            period_ticks,
            cancelled: AtomicBool::new(false),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Id of the module that scheduled this task.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn lane(&self) -> ExecutionLane {
        self.lane
    }

    pub fn is_async(&self) -> bool {
        self.lane == ExecutionLane::Async
    }

    pub fn next_run_tick(&self) -> u64 {
        self.next_run_tick
    }

    /// Period in ticks; `0` means one-shot.
    pub fn period_ticks(&self) -> u64 {
        self.period_ticks
    }

    pub fn is_repeating(&self) -> bool {
        self.period_ticks > 0
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Clone of the work closure.
    pub fn work(&self) -> TaskWork {
        self.work.clone()
    }

    /// Mark the task cancelled. The scheduler drops it on its next pass.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the task is due at `tick`.
    ///
    /// Repeating tasks fire when `tick` lands on their cadence relative to
    /// `next_run_tick`, so a late start does not shift later firings.
    pub fn should_run(&self, tick: u64) -> bool {
        if self.is_cancelled() || tick < self.next_run_tick {
            return false;
        }
        if self.period_ticks == 0 {
            return true;
        }
        (tick - self.next_run_tick) % self.period_ticks == 0
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("lane", &self.lane)
            .field("next_run_tick", &self.next_run_tick)
            .field("period_ticks", &self.period_ticks)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
