//! Per-module scheduler handle.

use std::sync::Arc;

use super::{ExecutionLane, ScheduledTask, TaskId, TaskScheduler};

/// Scheduler handle bound to one module.
///
/// Every task scheduled through it is tagged with the module id so the host
/// can cancel the module's tasks in bulk when it is disabled.
#[derive(Clone)]
pub struct ModuleScheduler {
    owner: String,
    inner: Arc<dyn TaskScheduler>,
}

impl ModuleScheduler {
    pub fn new(owner: impl Into<String>, inner: Arc<dyn TaskScheduler>) -> Self {
        Self {
            owner: owner.into(),
            inner,
        }
    }

    /// Id of the owning module.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The underlying scheduler.
    pub fn scheduler(&self) -> &Arc<dyn TaskScheduler> {
        &self.inner
    }

    pub fn current_tick(&self) -> u64 {
        self.inner.current_tick()
    }

    /// Run on the next tick, on the driver.
    pub fn run_task<F>(&self, work: F) -> Arc<ScheduledTask>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule(work, ExecutionLane::Sync, 0, 0)
    }

    /// Run once after `delay_ticks`, on the driver.
    pub fn run_task_later<F>(&self, work: F, delay_ticks: i64) -> Arc<ScheduledTask>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule(work, ExecutionLane::Sync, delay_ticks, 0)
    }

    /// Run every `period_ticks` after `delay_ticks`, on the driver.
    pub fn run_task_timer<F>(&self, work: F, delay_ticks: i64, period_ticks: i64) -> Arc<ScheduledTask>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule(work, ExecutionLane::Sync, delay_ticks, period_ticks)
    }

    /// Run on the next tick, on the worker pool.
    pub fn run_task_async<F>(&self, work: F) -> Arc<ScheduledTask>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule(work, ExecutionLane::Async, 0, 0)
    }

    /// Run once after `delay_ticks`, on the worker pool.
    pub fn run_task_later_async<F>(&self, work: F, delay_ticks: i64) -> Arc<ScheduledTask>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule(work, ExecutionLane::Async, delay_ticks, 0)
    }

    /// Run every `period_ticks` after `delay_ticks`, on the worker pool.
    pub fn run_task_timer_async<F>(
        &self,
        work: F,
        delay_ticks: i64,
        period_ticks: i64,
    ) -> Arc<ScheduledTask>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.schedule(work, ExecutionLane::Async, delay_ticks, period_ticks)
    }

    /// Cancel one of this module's tasks by id.
    ///
    /// Returns false for unknown ids and for tasks owned by another module.
    pub fn cancel_task(&self, task_id: TaskId) -> bool {
        let owned = self
            .inner
            .tasks()
            .iter()
            .any(|task| task.id() == task_id && task.owner() == self.owner);
        owned && self.inner.cancel_task(task_id)
    }

    /// Tasks owned by this module.
    pub fn tasks(&self) -> Vec<Arc<ScheduledTask>> {
        self.inner
            .tasks()
            .into_iter()
            .filter(|task| task.owner() == self.owner)
            .collect()
    }

    fn schedule<F>(&self, work: F, lane: ExecutionLane, delay: i64, period: i64) -> Arc<ScheduledTask>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner
            .schedule(&self.owner, Arc::new(work), lane, delay, period)
    }
}
