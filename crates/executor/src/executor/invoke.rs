//! Bulk invocation: run a batch and wait for all, or for the first success

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, instrument, warn};

use super::{run_guarded, ChildKind, Executor};
use crate::error::{ExecutorError, ExecutorResult, TaskCause};
use crate::future::{Completion, TaskFuture};
use crate::task::BoxCallable;

/// Wakes the waiter once every child of a batch has ended
struct Countdown {
    remaining: AtomicUsize,
    finished: Notify,
}

impl Countdown {
    fn new(count: usize) -> Arc<Self> {
        Arc::new(Self { remaining: AtomicUsize::new(count), finished: Notify::new() })
    }
}

/// Counts one child as ended when dropped, however the child ended
struct CountdownGuard(Arc<Countdown>);

impl Drop for CountdownGuard {
    fn drop(&mut self) {
        if self.0.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.finished.notify_one();
        }
    }
}

/// Shared state of an `invoke_any` race
struct Race<T> {
    countdown: Arc<Countdown>,
    won: AtomicBool,
    winner: Mutex<Option<T>>,
    last_failure: Mutex<Option<TaskCause>>,
}

impl<T> Race<T> {
    fn offer(&self, value: T) {
        if self.won.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok() {
            *self.winner.lock() = Some(value);
            self.countdown.finished.notify_one();
        }
    }
}

impl Executor {
    /// Wait on `countdown`, bounded by `timeout` on the executor clock
    ///
    /// Returns false if the bound elapsed first.
    async fn await_batch(&self, countdown: &Countdown, timeout: Option<Duration>) -> bool {
        match timeout {
            None => {
                countdown.finished.notified().await;
                true
            }
            Some(timeout) => tokio::select! {
                biased;
                () = countdown.finished.notified() => true,
                () = self.clock().sleep(timeout) => false,
            },
        }
    }

    /// Run every task and wait until all of them ended
    ///
    /// Returns one settled future per task, in input order. With a timeout,
    /// tasks still running when it elapses are cancelled. A zero timeout
    /// cancels every task without running any.
    ///
    /// # Errors
    ///
    /// `Rejected` after shutdown.
    #[instrument(skip(self, tasks), fields(executor = %self.name(), tasks = tasks.len()))]
    pub async fn invoke_all<T>(
        &self,
        tasks: Vec<BoxCallable<T>>,
        timeout: Option<Duration>,
    ) -> ExecutorResult<Vec<TaskFuture<T>>>
    where
        T: Send + Sync + 'static,
    {
        self.ensure_running()?;
        if timeout == Some(Duration::ZERO) {
            debug!("Zero timeout, cancelling every task up front");
            return Ok(tasks
                .iter()
                .map(|_| TaskFuture::cancelled(Arc::clone(self.clock())))
                .collect());
        }
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let admissions =
            tasks.iter().map(|_| self.admit()).collect::<ExecutorResult<Vec<_>>>()?;
        let countdown = Countdown::new(tasks.len());
        let mut futures = Vec::with_capacity(tasks.len());

        for (task, admission) in tasks.into_iter().zip(admissions) {
            let completion = Arc::new(Completion::new(admission.token()));
            futures.push(TaskFuture::new(Arc::clone(&completion), Arc::clone(self.clock())));

            let cell = Arc::clone(&completion);
            let guard = CountdownGuard(Arc::clone(&countdown));
            self.spawn_child(admission, ChildKind::Immediate, completion, async move {
                let _guard = guard;
                let result = run_guarded(&cell, move || task.call()).await;
                cell.finish(result);
            });
        }

        if !self.await_batch(&countdown, timeout).await {
            let cancelled = futures.iter().filter(|future| future.cancel(true)).count();
            warn!(cancelled, "invoke_all timed out");
        }
        Ok(futures)
    }

    /// Run every task and return the value of the first one to succeed
    ///
    /// Once a result is known every other task is cancelled.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty batch
    /// - `Rejected` after shutdown
    /// - `Timeout` if no task succeeded in time (at once for a zero timeout)
    /// - `Execution` with the most recent failure if every task failed
    /// - `Cancelled` if the tasks were cancelled from outside, without any
    ///   success or failure
    #[instrument(skip(self, tasks), fields(executor = %self.name(), tasks = tasks.len()))]
    pub async fn invoke_any<T>(
        &self,
        tasks: Vec<BoxCallable<T>>,
        timeout: Option<Duration>,
    ) -> ExecutorResult<T>
    where
        T: Send + 'static,
    {
        if tasks.is_empty() {
            return Err(ExecutorError::invalid_argument("invoke_any needs at least one task"));
        }
        self.ensure_running()?;
        if let Some(duration) = timeout.filter(|timeout| timeout.is_zero()) {
            return Err(ExecutorError::Timeout { duration });
        }

        let admissions =
            tasks.iter().map(|_| self.admit()).collect::<ExecutorResult<Vec<_>>>()?;
        let race = Arc::new(Race {
            countdown: Countdown::new(tasks.len()),
            won: AtomicBool::new(false),
            winner: Mutex::new(None),
            last_failure: Mutex::new(None),
        });
        let mut children = Vec::with_capacity(tasks.len());

        for (task, admission) in tasks.into_iter().zip(admissions) {
            let completion = Arc::new(Completion::<()>::new(admission.token()));
            children.push(TaskFuture::new(Arc::clone(&completion), Arc::clone(self.clock())));

            let cell = Arc::clone(&completion);
            let race = Arc::clone(&race);
            self.spawn_child(admission, ChildKind::Immediate, completion, async move {
                let _guard = CountdownGuard(Arc::clone(&race.countdown));
                match run_guarded(&cell, move || task.call()).await {
                    Some(Ok(value)) => {
                        race.offer(value);
                        cell.complete(());
                    }
                    Some(Err(err)) => {
                        let cause: TaskCause = Arc::from(err);
                        *race.last_failure.lock() = Some(Arc::clone(&cause));
                        cell.fail_with(cause);
                    }
                    None => {
                        cell.mark_cancelled();
                    }
                }
            });
        }

        let in_time = self.await_batch(&race.countdown, timeout).await;
        for child in &children {
            child.cancel(true);
        }

        if let Some(value) = race.winner.lock().take() {
            return Ok(value);
        }
        if !in_time {
            let duration = timeout.unwrap_or_default();
            warn!(?duration, "invoke_any timed out");
            return Err(ExecutorError::Timeout { duration });
        }
        let last_failure = race.last_failure.lock().take();
        match last_failure {
            Some(cause) => Err(ExecutorError::Execution { cause }),
            None => Err(ExecutorError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use cadence_common::testing::settle;
    use cadence_common::time::MockClock;
    use tokio::runtime::Handle;

    use super::*;
    use crate::task::{callable, BoxError};

    /// Validates `invoke_all` returns settled futures in input order.
    #[tokio::test]
    async fn test_invoke_all_in_order() {
        let executor = Executor::new(Handle::current());
        let tasks = vec![
            callable(|| async { Ok(1) }),
            callable(|| async { Err(BoxError::from("two")) }),
            callable(|| async { Ok(3) }),
        ];

        let futures = executor.invoke_all(tasks, None).await.unwrap();

        assert!(futures.iter().all(TaskFuture::is_done));
        assert_eq!(futures[0].get().await.unwrap(), 1);
        assert!(futures[1].get().await.is_err());
        assert_eq!(futures[2].get().await.unwrap(), 3);
    }

    /// Validates an empty batch returns an empty list.
    #[tokio::test]
    async fn test_invoke_all_empty() {
        let executor = Executor::new(Handle::current());
        let futures = executor.invoke_all(Vec::<BoxCallable<u8>>::new(), None).await.unwrap();
        assert!(futures.is_empty());
    }

    /// Validates `invoke_any` input validation.
    ///
    /// Assertions:
    /// - Ensures an empty batch is an invalid argument.
    /// - Ensures a zero timeout fails fast without running anything.
    #[tokio::test]
    async fn test_invoke_any_arguments() {
        let executor = Executor::new(Handle::current());

        let err = executor.invoke_any(Vec::<BoxCallable<u8>>::new(), None).await.unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidArgument { .. }));

        let tasks = vec![callable(|| async { Ok(1_u8) })];
        let err = executor.invoke_any(tasks, Some(Duration::ZERO)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout { .. }));
        assert_eq!(executor.stats().submitted, 0);
    }

    /// Validates a bounded `invoke_any` times out on the injected clock.
    #[tokio::test]
    async fn test_invoke_any_timeout_on_mock_clock() {
        let clock = MockClock::new();
        let executor = Executor::with_clock(Handle::current(), Arc::new(clock.clone()));
        let tasks: Vec<BoxCallable<u8>> = vec![callable(|| std::future::pending())];

        let racer = {
            let executor = executor.clone();
            tokio::spawn(
                async move { executor.invoke_any(tasks, Some(Duration::from_secs(3))).await },
            )
        };
        settle().await;
        clock.advance(Duration::from_secs(3));

        let err = racer.await.unwrap().unwrap_err();
        assert!(
            matches!(err, ExecutorError::Timeout { duration } if duration == Duration::from_secs(3))
        );
        settle().await;
        assert_eq!(executor.stats().cancelled, 1);
    }
}
