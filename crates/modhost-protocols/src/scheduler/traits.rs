//! Scheduler trait definition.

use std::sync::Arc;
use std::time::Duration;

use super::{ExecutionLane, ScheduledTask, TaskId, TaskWork};

/// Tick-driven task scheduler.
///
/// All methods are non-blocking and callable from any thread, including
/// from inside task bodies.
pub trait TaskScheduler: Send + Sync {
    /// Real-time length of one tick.
    fn tick_rate(&self) -> Duration;

    /// Current value of the virtual clock.
    fn current_tick(&self) -> u64;

    /// Schedule work for `owner`.
    ///
    /// Negative delays are treated as zero; a non-positive period makes the
    /// task one-shot.
    fn schedule(
        &self,
        owner: &str,
        work: TaskWork,
        lane: ExecutionLane,
        delay_ticks: i64,
        period_ticks: i64,
    ) -> Arc<ScheduledTask>;

    /// Cancel a task. Returns false if the id is unknown or already removed.
    fn cancel_task(&self, task_id: TaskId) -> bool;

    /// Cancel every task owned by `owner`. Returns the number cancelled.
    fn cancel_tasks_for(&self, owner: &str) -> usize;

    /// Snapshot of the task table.
    fn tasks(&self) -> Vec<Arc<ScheduledTask>>;
}
