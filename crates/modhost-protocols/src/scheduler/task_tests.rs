use super::*;

fn noop() -> TaskWork {
    Arc::new(|| Ok(()))
}

#[test]
fn test_one_shot_due_from_next_run() {
    let task = ScheduledTask::new(1, "m", noop(), ExecutionLane::Sync, 5, 0);
    assert!(!task.is_repeating());
    assert!(!task.should_run(4));
    assert!(task.should_run(5));
    assert!(task.should_run(9));
}

#[test]
fn test_repeating_cadence() {
    let task = ScheduledTask::new(1, "m", noop(), ExecutionLane::Sync, 0, 4);
    let fired: Vec<u64> = (0..13).filter(|t| task.should_run(*t)).collect();
    assert_eq!(fired, vec![0, 4, 8, 12]);
}

#[test]
fn test_repeating_with_delay_keeps_phase() {
    let task = ScheduledTask::new(1, "m", noop(), ExecutionLane::Async, 3, 5);
    assert!(!task.should_run(0));
    assert!(task.should_run(3));
    assert!(!task.should_run(4));
    assert!(task.should_run(8));
    assert!(task.should_run(13));
}

#[test]
fn test_cancelled_never_runs() {
    let task = ScheduledTask::new(7, "m", noop(), ExecutionLane::Sync, 0, 1);
    assert!(task.should_run(0));
    task.cancel();
    assert!(task.is_cancelled());
    assert!(!task.should_run(1));
}

#[test]
fn test_accessors() {
    let task = ScheduledTask::new(42, "owner", noop(), ExecutionLane::Async, 10, 2);
    assert_eq!(task.id(), 42);
    assert_eq!(task.owner(), "owner");
    assert!(task.is_async());
    assert_eq!(task.next_run_tick(), 10);
    assert_eq!(task.period_ticks(), 2);
    assert!((task.work())().is_ok());
}

#[test]
fn test_debug_omits_work() {
    let task = ScheduledTask::new(3, "m", noop(), ExecutionLane::Sync, 0, 0);
    let debug = format!("{:?}", task);
    assert!(debug.contains("ScheduledTask"));
    assert!(debug.contains("owner"));
}
