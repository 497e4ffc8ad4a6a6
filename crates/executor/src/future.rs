//! One-shot result cells handed back by the executor
//!
//! A [`TaskFuture`] is settled exactly once, by whichever happens first:
//! the body completes, the body fails, or [`TaskFuture::cancel`] succeeds.
//! Settlement is a single `OnceLock` assignment followed by a `watch`
//! broadcast, so every reader observes the same terminal outcome.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use cadence_common::time::Clock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{ExecutorError, ExecutorResult, TaskCause};
use crate::task::{BoxError, TaskResult};

/// Terminal outcome of a future, without its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The body returned a value
    Completed,
    /// The body returned an error
    Failed,
    /// Cancellation won before the body produced a result
    Cancelled,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

enum Settled<T> {
    Value(T),
    Failed(TaskCause),
    Cancelled,
}

impl<T> Settled<T> {
    fn outcome(&self) -> TaskOutcome {
        match self {
            Self::Value(_) => TaskOutcome::Completed,
            Self::Failed(_) => TaskOutcome::Failed,
            Self::Cancelled => TaskOutcome::Cancelled,
        }
    }
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const CLOSED: u8 = 2;

/// Shared state behind a [`TaskFuture`]
///
/// Written by the executor's child task, read by every handle clone.
pub(crate) struct Completion<T> {
    settled: OnceLock<Settled<T>>,
    done: watch::Sender<bool>,
    /// `IDLE`, `RUNNING` while the body executes, `CLOSED` once no run may start
    phase: AtomicU8,
    cancel: CancellationToken,
}

impl<T> Completion<T> {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        let (done, _) = watch::channel(false);
        Self { settled: OnceLock::new(), done, phase: AtomicU8::new(IDLE), cancel }
    }

    fn settle(&self, settled: Settled<T>) -> bool {
        if self.settled.set(settled).is_err() {
            return false;
        }
        self.done.send_replace(true);
        true
    }

    pub(crate) fn complete(&self, value: T) -> bool {
        self.settle(Settled::Value(value))
    }

    pub(crate) fn fail(&self, error: BoxError) -> bool {
        self.fail_with(Arc::from(error))
    }

    pub(crate) fn fail_with(&self, cause: TaskCause) -> bool {
        self.settle(Settled::Failed(cause))
    }

    pub(crate) fn mark_cancelled(&self) -> bool {
        self.settle(Settled::Cancelled)
    }

    /// Record what a guarded run produced; `None` means it was cancelled
    pub(crate) fn finish(&self, result: Option<TaskResult<T>>) -> bool {
        match result {
            Some(Ok(value)) => self.complete(value),
            Some(Err(error)) => self.fail(error),
            None => self.mark_cancelled(),
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn is_done(&self) -> bool {
        self.settled.get().is_some()
    }

    pub(crate) fn outcome(&self) -> Option<TaskOutcome> {
        self.settled.get().map(Settled::outcome)
    }

    /// Flag the body as executing; false if the future is already terminal
    pub(crate) fn begin_run(&self) -> bool {
        if self
            .phase
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if self.is_done() {
            self.end_run();
            return false;
        }
        true
    }

    pub(crate) fn end_run(&self) {
        let _ = self.phase.compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire);
    }

    pub(crate) fn cancel(&self, may_interrupt: bool) -> bool {
        if self.is_done() {
            return false;
        }
        if may_interrupt {
            self.phase.store(CLOSED, Ordering::Release);
        } else if self
            .phase
            .compare_exchange(IDLE, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if !self.mark_cancelled() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    async fn settled(&self) -> &Settled<T> {
        loop {
            if let Some(settled) = self.settled.get() {
                return settled;
            }
            let mut done = self.done.subscribe();
            // `done` flips only after `settled` is set, so the loop ends on
            // the next pass.
            let _ = done.wait_for(|done| *done).await;
        }
    }
}

/// Cancellation entry point the executor keeps for every live child
pub(crate) trait CancelHandle: Send + Sync {
    fn cancel(&self, may_interrupt: bool) -> bool;
    fn is_done(&self) -> bool;
    fn outcome(&self) -> Option<TaskOutcome>;
}

impl<T: Send + Sync> CancelHandle for Completion<T> {
    fn cancel(&self, may_interrupt: bool) -> bool {
        Completion::cancel(self, may_interrupt)
    }

    fn is_done(&self) -> bool {
        Completion::is_done(self)
    }

    fn outcome(&self) -> Option<TaskOutcome> {
        Completion::outcome(self)
    }
}

/// Handle to the eventual outcome of a submitted task
///
/// Cloning is cheap; every clone observes the same outcome.
///
/// # Examples
///
/// ```
/// use cadence_executor::Executor;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), cadence_executor::ExecutorError> {
/// let executor = Executor::new(tokio::runtime::Handle::current());
/// let future = executor.submit(|| async { Ok(6 * 7) })?;
///
/// assert_eq!(future.get().await?, 42);
/// assert!(future.is_done());
/// # Ok(())
/// # }
/// ```
pub struct TaskFuture<T> {
    inner: Arc<Completion<T>>,
    clock: Arc<dyn Clock>,
}

impl<T> Clone for TaskFuture<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner), clock: Arc::clone(&self.clock) }
    }
}

impl<T> fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture").field("outcome", &self.outcome()).finish()
    }
}

impl<T> TaskFuture<T> {
    pub(crate) fn new(inner: Arc<Completion<T>>, clock: Arc<dyn Clock>) -> Self {
        Self { inner, clock }
    }

    /// A future that is already cancelled and never runs anything
    pub(crate) fn cancelled(clock: Arc<dyn Clock>) -> Self {
        let completion = Completion::new(CancellationToken::new());
        completion.mark_cancelled();
        Self::new(Arc::new(completion), clock)
    }

    pub(crate) fn completion(&self) -> &Arc<Completion<T>> {
        &self.inner
    }

    /// Request cancellation
    ///
    /// Returns `false` if the future is already terminal, or if
    /// `may_interrupt` is `false` while the body is executing. Otherwise the
    /// future is settled as cancelled and the body is dropped at its next
    /// suspension point.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.inner.cancel(may_interrupt)
    }

    /// True once the future reached any terminal outcome
    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    /// True if cancellation settled the future
    pub fn is_cancelled(&self) -> bool {
        self.outcome() == Some(TaskOutcome::Cancelled)
    }

    /// Terminal outcome, or `None` while still pending
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.inner.outcome()
    }
}

impl<T: Clone> TaskFuture<T> {
    fn read(settled: &Settled<T>) -> ExecutorResult<T> {
        match settled {
            Settled::Value(value) => Ok(value.clone()),
            Settled::Failed(cause) => Err(ExecutorError::Execution { cause: Arc::clone(cause) }),
            Settled::Cancelled => Err(ExecutorError::Cancelled),
        }
    }

    /// Wait for the outcome
    ///
    /// # Errors
    ///
    /// `Execution` if the body failed, `Cancelled` if cancellation won.
    pub async fn get(&self) -> ExecutorResult<T> {
        Self::read(self.inner.settled().await)
    }

    /// Wait for the outcome for at most `timeout` on the executor's clock
    ///
    /// Giving up does not cancel the task.
    ///
    /// # Errors
    ///
    /// `Timeout` if the bound elapses first, otherwise as [`Self::get`].
    pub async fn get_timeout(&self, timeout: Duration) -> ExecutorResult<T> {
        tokio::select! {
            biased;
            settled = self.inner.settled() => Self::read(settled),
            () = self.clock.sleep(timeout) => Err(ExecutorError::Timeout { duration: timeout }),
        }
    }

    /// Park the calling thread until the outcome is known
    ///
    /// For callers outside any async context. Must not be called from a
    /// thread that drives the executor's dispatcher, or the task can never
    /// make progress.
    ///
    /// # Errors
    ///
    /// As [`Self::get`].
    pub fn blocking_get(&self) -> ExecutorResult<T> {
        futures::executor::block_on(self.get())
    }
}
