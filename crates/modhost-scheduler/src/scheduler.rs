//! Tick-driven task scheduler.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use modhost_protocols::{ExecutionLane, ModuleScheduler, ScheduledTask, TaskId, TaskScheduler, TaskWork};

use crate::clock::TickClock;
use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::pool::{execute, PoolStats, WorkerPool};

thread_local! {
    static ON_DRIVER: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as the driver for the duration of a tick.
struct DriverGuard;

impl DriverGuard {
    fn enter() -> Self {
        ON_DRIVER.with(|flag| flag.set(true));
        Self
    }
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        ON_DRIVER.with(|flag| flag.set(false));
    }
}

/// Outcome of a single driver step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick that was processed.
    pub tick: u64,
    /// Sync-lane tasks executed inline.
    pub ran_sync: usize,
    /// Async-lane tasks handed to the pool.
    pub dispatched_async: usize,
    /// Sync-lane tasks that returned an error or panicked.
    pub failed: usize,
    /// Cancelled tasks dropped from the table.
    pub purged: usize,
}

/// Scheduler statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub current_tick: u64,
    pub pending_tasks: usize,
    pub running: bool,
    pub pool: PoolStats,
}

struct Driver {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Fixed-rate scheduler dispatching work on a virtual tick clock.
///
/// Tasks live in a concurrent table keyed by id. The driver is the only
/// writer of the clock; registration and cancellation may happen from any
/// thread, including from inside running tasks.
pub struct TickScheduler {
    config: SchedulerConfig,
    clock: TickClock,
    tasks: DashMap<TaskId, Arc<ScheduledTask>>,
    next_id: AtomicU64,
    pool: WorkerPool,
    shutting_down: AtomicBool,
    tick_lock: Mutex<()>,
    driver: Mutex<Option<Driver>>,
}

impl TickScheduler {
    /// Create a new scheduler. The driver is not started.
    pub fn new(config: SchedulerConfig) -> Self {
        let clock = TickClock::new(config.tick_rate());
        Self {
            config,
            clock,
            tasks: DashMap::new(),
            next_id: AtomicU64::new(0),
            pool: WorkerPool::new(),
            shutting_down: AtomicBool::new(false),
            tick_lock: Mutex::new(()),
            driver: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// Start the fixed-rate driver on the current tokio runtime.
    ///
    /// Ticks missed because of slow sync work are replayed back to back.
    pub fn start(self: &Arc<Self>) -> SchedulerResult<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(SchedulerError::ShuttingDown);
        }
        let runtime = Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;

        let mut driver = self.driver.lock();
        if driver.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let scheduler = Arc::clone(self);
        let tick_rate = self.clock.tick_rate();

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(tick_rate);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => {
                        debug!("Scheduler driver stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        let step = Arc::clone(&scheduler);
                        if let Err(e) = tokio::task::spawn_blocking(move || step.tick()).await {
                            error!("Scheduler tick failed: {}", e);
                        }
                    }
                }
            }
        });

        *driver = Some(Driver { token, handle });
        info!("Scheduler started at {:?} per tick", tick_rate);
        Ok(())
    }

    /// Whether the driver is running.
    pub fn is_running(&self) -> bool {
        self.driver.lock().is_some()
    }

    /// Whether the calling thread is currently executing a driver step.
    pub fn is_on_driver() -> bool {
        ON_DRIVER.with(|flag| flag.get())
    }

    /// Run one driver step and advance the clock.
    ///
    /// Tasks are visited in id order. Sync-lane tasks run inline, async-lane
    /// tasks go to the worker pool. One-shot tasks leave the table once
    /// dispatched; cancelled tasks are purged.
    pub fn tick(&self) -> TickReport {
        let _step = self.tick_lock.lock();
        let _driver = DriverGuard::enter();

        let now = self.clock.current();
        let mut report = TickReport {
            tick: now,
            ..TickReport::default()
        };

        let mut snapshot: Vec<Arc<ScheduledTask>> =
            self.tasks.iter().map(|entry| entry.value().clone()).collect();
        snapshot.sort_by_key(|task| task.id());

        for task in snapshot {
            if task.is_cancelled() {
                self.tasks.remove(&task.id());
                report.purged += 1;
                continue;
            }
            if !task.should_run(now) {
                continue;
            }

            trace!(task_id = task.id(), owner = %task.owner(), "Dispatching task at tick {}", now);
            match task.lane() {
                ExecutionLane::Sync => {
                    report.ran_sync += 1;
                    if !execute(&task) {
                        report.failed += 1;
                    }
                }
                ExecutionLane::Async => {
                    if self.pool.submit(task.clone()) {
                        report.dispatched_async += 1;
                    }
                }
            }

            if !task.is_repeating() {
                self.tasks.remove(&task.id());
            }
        }

        self.clock.advance();
        report
    }

    /// Register a task. See [`TaskScheduler::schedule`].
    pub fn schedule_task(
        &self,
        owner: &str,
        work: TaskWork,
        lane: ExecutionLane,
        delay_ticks: i64,
        period_ticks: i64,
    ) -> Arc<ScheduledTask> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = delay_ticks.max(0) as u64;
        let period = period_ticks.max(0) as u64;
        let task = Arc::new(ScheduledTask::new(
            id,
            owner,
            work,
            lane,
            self.clock.current().saturating_add(delay),
            period,
        ));

        if self.shutting_down.load(Ordering::SeqCst) {
            warn!(owner = %owner, "Scheduler is shutting down, task #{} will not run", id);
            task.cancel();
            return task;
        }

        self.tasks.insert(id, task.clone());
        // shutdown() may have cleared the table between the check and the insert
        if self.shutting_down.load(Ordering::SeqCst) {
            self.tasks.remove(&id);
            warn!(owner = %owner, "Scheduler is shutting down, task #{} will not run", id);
            task.cancel();
            return task;
        }

        debug!(
            task_id = id,
            owner = %owner,
            lane = ?lane,
            "Scheduled task at tick {} (in {:?}) every {} tick(s)",
            task.next_run_tick(),
            self.clock.ticks_to_duration(delay),
            period
        );
        task
    }

    /// Look up a task in the table.
    pub fn task(&self, task_id: TaskId) -> SchedulerResult<Arc<ScheduledTask>> {
        self.tasks
            .get(&task_id)
            .map(|entry| entry.value().clone())
            .ok_or(SchedulerError::UnknownTask(task_id))
    }

    /// Cancel every task in the table. Returns the number cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        self.tasks.retain(|_, task| {
            task.cancel();
            cancelled += 1;
            false
        });
        cancelled
    }

    /// Scheduler handle that tags every task with `owner`.
    pub fn for_module(self: &Arc<Self>, owner: impl Into<String>) -> ModuleScheduler {
        ModuleScheduler::new(owner, Arc::clone(self) as Arc<dyn TaskScheduler>)
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            current_tick: self.clock.current(),
            pending_tasks: self.tasks.len(),
            running: self.is_running(),
            pool: self.pool.stats(),
        }
    }

    /// Stop the driver, clear the task table and stop the pool.
    ///
    /// In-flight async work is not interrupted.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down scheduler");

        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            driver.token.cancel();
            if let Err(e) = driver.handle.await {
                if !e.is_cancelled() {
                    warn!("Scheduler driver ended abnormally: {}", e);
                }
            }
        }

        let dropped = self.cancel_all();
        self.pool.shutdown();
        info!(
            "Scheduler stopped at tick {}, {} pending task(s) discarded",
            self.clock.current(),
            dropped
        );
    }

    /// Wait for in-flight async work, up to `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        self.pool.wait_idle(timeout).await
    }
}

impl TaskScheduler for TickScheduler {
    fn tick_rate(&self) -> Duration {
        self.clock.tick_rate()
    }

    fn current_tick(&self) -> u64 {
        self.clock.current()
    }

    fn schedule(
        &self,
        owner: &str,
        work: TaskWork,
        lane: ExecutionLane,
        delay_ticks: i64,
        period_ticks: i64,
    ) -> Arc<ScheduledTask> {
        self.schedule_task(owner, work, lane, delay_ticks, period_ticks)
    }

    fn cancel_task(&self, task_id: TaskId) -> bool {
        match self.tasks.remove(&task_id) {
            Some((_, task)) => {
                task.cancel();
                debug!(task_id, owner = %task.owner(), "Cancelled task");
                true
            }
            None => false,
        }
    }

    fn cancel_tasks_for(&self, owner: &str) -> usize {
        let mut cancelled = 0;
        self.tasks.retain(|_, task| {
            if task.owner() == owner {
                task.cancel();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        if cancelled > 0 {
            debug!(owner = %owner, "Cancelled {} task(s)", cancelled);
        }
        cancelled
    }

    fn tasks(&self) -> Vec<Arc<ScheduledTask>> {
        let mut tasks: Vec<_> = self.tasks.iter().map(|entry| entry.value().clone()).collect();
        tasks.sort_by_key(|task| task.id());
        tasks
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
