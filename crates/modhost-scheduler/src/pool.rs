//! Worker pool for the async lane.
//!
//! Async-lane work is handed to tokio's blocking pool, which grows and
//! shrinks on demand. The pool is unbounded: there is no back-pressure on
//! submissions.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use modhost_protocols::{panic_message, ScheduledTask};

/// Run a task's work, containing errors and panics.
///
/// Returns true when the work completed successfully.
pub(crate) fn execute(task: &ScheduledTask) -> bool {
    let work = task.work();
    match panic::catch_unwind(AssertUnwindSafe(|| work())) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(
                task_id = task.id(),
                owner = %task.owner(),
                "Task #{} threw an error while executing: {:#}",
                task.id(),
                e
            );
            false
        }
        Err(payload) => {
            error!(
                task_id = task.id(),
                owner = %task.owner(),
                "Task #{} panicked while executing: {}",
                task.id(),
                panic_message(payload.as_ref())
            );
            false
        }
    }
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub in_flight: usize,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Decrements the in-flight count even if the work panics past `execute`.
struct InFlightGuard(Arc<Counters>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Dynamically sized pool executing async-lane tasks.
pub struct WorkerPool {
    accepting: AtomicBool,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new() -> Self {
        Self {
            accepting: AtomicBool::new(true),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Submit a task for execution.
    ///
    /// Returns false if the pool has been shut down. Outside a tokio runtime
    /// the work runs inline on the caller.
    pub fn submit(&self, task: Arc<ScheduledTask>) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            warn!("Worker pool is shut down, dropping task #{}", task.id());
            return false;
        }

        self.counters.in_flight.fetch_add(1, Ordering::SeqCst);
        let counters = self.counters.clone();
        let job = move || {
            let _guard = InFlightGuard(counters.clone());
            if execute(&task) {
                counters.completed.fetch_add(1, Ordering::SeqCst);
            } else {
                counters.failed.fetch_add(1, Ordering::SeqCst);
            }
        };

        match Handle::try_current() {
            Ok(handle) => {
                debug!("Dispatching async task to worker pool");
                drop(handle.spawn_blocking(job));
            }
            Err(_) => {
                warn!("No tokio runtime for async lane, running task inline");
                job();
            }
        }
        true
    }

    /// Stop accepting new work. In-flight work runs to completion.
    pub fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            info!(
                "Worker pool shut down with {} task(s) in flight",
                self.in_flight()
            );
        }
    }

    /// Number of tasks currently executing.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            in_flight: self.in_flight(),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    /// Wait until no work is in flight, up to `timeout`.
    ///
    /// Returns true if the pool drained in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.in_flight() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
