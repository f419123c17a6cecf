//! # modhost Scheduler
//!
//! Tick-driven task scheduler for modhost modules.
//!
//! A single driver advances a virtual [`TickClock`] at a fixed real-time
//! rate (20 ticks per second by default). On every tick the driver scans the
//! task table and dispatches due work either inline on the driver (sync lane)
//! or to the [`WorkerPool`] (async lane).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use modhost_scheduler::{SchedulerConfig, TickScheduler};
//!
//! #[tokio::main]
//! async fn main() {
//!     let scheduler = Arc::new(TickScheduler::new(SchedulerConfig::default()));
//!     scheduler.start().unwrap();
//!
//!     let handle = scheduler.for_module("greeter");
//!     handle.run_task_timer(|| { println!("tick"); Ok(()) }, 0, 20);
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod pool;
pub mod scheduler;

pub use clock::TickClock;
pub use config::SchedulerConfig;
pub use error::{SchedulerError, SchedulerResult};
pub use pool::{PoolStats, WorkerPool};
pub use scheduler::{SchedulerStats, TickReport, TickScheduler};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;
