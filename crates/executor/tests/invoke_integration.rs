//! Integration tests for bulk invocation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cadence_common::testing::settle;
use cadence_executor::{callable, BoxCallable, BoxError, Executor, ExecutorError, TaskOutcome};
use tokio::runtime::Handle;
use tokio::time::Instant;

fn after(millis: u64, value: &'static str) -> BoxCallable<&'static str> {
    callable(move || async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(value)
    })
}

fn fail_after(millis: u64, message: &'static str) -> BoxCallable<&'static str> {
    callable(move || async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Err(BoxError::from(message))
    })
}

/// Validates the first success wins the race and losers are cancelled.
///
/// # Test Steps
/// 1. Race a 1000ms task, a 10ms task and one that fails at once
/// 2. Confirm the 10ms value is returned after 10ms
/// 3. Confirm the slow task was cancelled rather than left running
#[tokio::test(start_paused = true)]
async fn test_invoke_any_first_success_wins() {
    let executor = Executor::new(Handle::current());
    let slow_finished = Arc::new(AtomicUsize::new(0));
    let slow_clone = Arc::clone(&slow_finished);
    let start = Instant::now();

    let tasks = vec![
        callable(move || async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            slow_clone.fetch_add(1, Ordering::SeqCst);
            Ok("slow")
        }),
        after(10, "fast"),
        fail_after(0, "broken"),
    ];

    let winner = executor.invoke_any(tasks, None).await.expect("a task succeeds");

    assert_eq!(winner, "fast");
    assert_eq!(start.elapsed(), Duration::from_millis(10));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(slow_finished.load(Ordering::SeqCst), 0);
    let stats = executor.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.cancelled, 1);
}

/// Validates that when every task fails the most recent failure is
/// reported.
///
/// # Test Steps
/// 1. Fail "a" after 30ms, "b" after 10ms and "c" after 20ms
/// 2. Confirm the error wraps "a", the last failure in time
#[tokio::test(start_paused = true)]
async fn test_invoke_any_all_fail_reports_last_failure() {
    let executor = Executor::new(Handle::current());
    let tasks = vec![fail_after(30, "a"), fail_after(10, "b"), fail_after(20, "c")];

    let err = executor.invoke_any(tasks, None).await.unwrap_err();

    assert!(matches!(err, ExecutorError::Execution { .. }));
    assert_eq!(err.cause().map(ToString::to_string).as_deref(), Some("a"));
}

/// Validates a bounded race that nobody wins in time.
#[tokio::test(start_paused = true)]
async fn test_invoke_any_timeout_cancels_all() {
    let executor = Executor::new(Handle::current());
    let tasks = vec![after(500, "x"), after(800, "y")];

    let err = executor.invoke_any(tasks, Some(Duration::from_millis(100))).await.unwrap_err();

    assert!(
        matches!(err, ExecutorError::Timeout { duration } if duration == Duration::from_millis(100))
    );
    settle().await;
    assert_eq!(executor.stats().cancelled, 2);
    assert_eq!(executor.stats().active, 0);
}

/// Validates a race cancelled from outside reports cancellation.
#[tokio::test(start_paused = true)]
async fn test_invoke_any_cancelled_by_shutdown_now() {
    let executor = Executor::new(Handle::current());
    let tasks = vec![after(10_000, "x"), after(20_000, "y")];

    let racer = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.invoke_any(tasks, None).await })
    };
    settle().await;
    executor.shutdown_now();

    let result = racer.await.expect("racer should join");
    assert!(matches!(result, Err(ExecutorError::Cancelled)));
}

/// Validates a zero timeout cancels every task without running any.
#[tokio::test(start_paused = true)]
async fn test_invoke_all_zero_timeout() {
    let executor = Executor::new(Handle::current());
    let ran = Arc::new(AtomicUsize::new(0));
    let tasks: Vec<BoxCallable<()>> = (0..3)
        .map(|_| {
            let ran = Arc::clone(&ran);
            callable(move || async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .collect();

    let futures = executor.invoke_all(tasks, Some(Duration::ZERO)).await.expect("accepted");

    assert_eq!(futures.len(), 3);
    assert!(futures.iter().all(|future| future.is_done() && future.is_cancelled()));
    settle().await;
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(executor.stats().submitted, 0);
}

/// Validates `invoke_all` with a bound keeps finished results and cancels
/// the stragglers.
///
/// # Test Steps
/// 1. Submit tasks finishing at 10ms and 50ms and one failing at 20ms
/// 2. Add a task that would take 5s and bound the batch at 100ms
/// 3. Confirm outcomes per position and that the call took 100ms
#[tokio::test(start_paused = true)]
async fn test_invoke_all_timeout_cancels_stragglers() {
    let executor = Executor::new(Handle::current());
    let start = Instant::now();
    let tasks = vec![after(10, "a"), fail_after(20, "b"), after(50, "c"), after(5_000, "d")];

    let futures =
        executor.invoke_all(tasks, Some(Duration::from_millis(100))).await.expect("accepted");

    assert_eq!(start.elapsed(), Duration::from_millis(100));
    let outcomes: Vec<_> = futures.iter().map(|future| future.outcome()).collect();
    assert_eq!(
        outcomes,
        vec![
            Some(TaskOutcome::Completed),
            Some(TaskOutcome::Failed),
            Some(TaskOutcome::Completed),
            Some(TaskOutcome::Cancelled),
        ]
    );
    assert_eq!(futures[2].get().await.expect("value"), "c");
}

/// Validates an unbounded `invoke_all` waits for the slowest task.
#[tokio::test(start_paused = true)]
async fn test_invoke_all_waits_for_every_task() {
    let executor = Executor::new(Handle::current());
    let start = Instant::now();
    let tasks = vec![after(40, "a"), after(5, "b"), fail_after(25, "c")];

    let futures = executor.invoke_all(tasks, None).await.expect("accepted");

    assert_eq!(start.elapsed(), Duration::from_millis(40));
    assert!(futures.iter().all(|future| future.is_done()));
    assert_eq!(futures[0].get().await.expect("value"), "a");
    assert_eq!(futures[1].get().await.expect("value"), "b");
}

/// Validates bulk calls are rejected after shutdown.
#[tokio::test]
async fn test_bulk_rejected_after_shutdown() {
    let executor = Executor::new(Handle::current());
    executor.shutdown();

    let err = executor.invoke_all(vec![after(1, "a")], None).await.unwrap_err();
    assert!(matches!(err, ExecutorError::Rejected { .. }));

    let err = executor.invoke_any(vec![after(1, "a")], None).await.unwrap_err();
    assert!(matches!(err, ExecutorError::Rejected { .. }));
    assert_eq!(executor.stats().rejected, 2);
}
