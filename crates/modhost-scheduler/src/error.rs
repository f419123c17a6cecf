//! Error types for the scheduler.

use thiserror::Error;

use modhost_protocols::TaskId;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No task with this id is in the task table.
    #[error("Unknown task: #{0}")]
    UnknownTask(TaskId),

    /// The driver has already been started.
    #[error("Scheduler driver is already running")]
    AlreadyRunning,

    /// The scheduler has been shut down.
    #[error("Scheduler is shutting down")]
    ShuttingDown,

    /// The driver needs a tokio runtime.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_task_display() {
        let err = SchedulerError::UnknownTask(42);
        assert_eq!(err.to_string(), "Unknown task: #42");
    }

    #[test]
    fn test_shutting_down_display() {
        assert!(SchedulerError::ShuttingDown.to_string().contains("shutting down"));
    }
}
