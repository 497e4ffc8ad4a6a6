//! The executor service
//!
//! An [`Executor`] layers futures, delayed and periodic scheduling and bulk
//! invocation on top of a tokio runtime it is handed. Every accepted task
//! becomes one child task on that runtime. Children are tracked three ways:
//!
//! - a [`TaskTracker`] counts them so shutdown can wait for the last one
//! - a root [`CancellationToken`] hands each child its own child token
//! - a map of cancel handles lets `shutdown_now` settle every future at once
//!
//! The lifecycle only moves forward: `Running`, then `Draining` once a
//! shutdown was requested, then `Terminated` once the last child finished.

mod invoke;
mod scheduling;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cadence_common::time::{Clock, SystemClock};
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::future::{CancelHandle, Completion, TaskFuture};
use crate::stats::{ExecutorStats, StatsRecorder};
use crate::task::{BoxCallable, BoxRunnable, TaskResult};

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const TERMINATED: u8 = 2;

/// Lifecycle state of an [`Executor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// Accepting new tasks
    Running,
    /// Shut down; accepted tasks are still finishing
    Draining,
    /// Shut down and every accepted task has finished
    Terminated,
}

impl ExecutorState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            RUNNING => Self::Running,
            DRAINING => Self::Draining,
            _ => Self::Terminated,
        }
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// How a child was scheduled; drives the shutdown policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChildKind {
    Immediate,
    Delayed,
    Periodic,
}

struct ChildEntry {
    cancel: Arc<dyn CancelHandle>,
    kind: ChildKind,
}

/// Permission to spawn one child, taken before the state check
pub(crate) struct Admission {
    id: u64,
    token: CancellationToken,
    tracked: TaskTrackerToken,
}

impl Admission {
    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

pub(crate) struct ExecutorInner {
    config: ExecutorConfig,
    dispatcher: Handle,
    clock: Arc<dyn Clock>,
    origin: Instant,
    state: AtomicU8,
    tracker: TaskTracker,
    root: CancellationToken,
    children: DashMap<u64, ChildEntry>,
    next_id: AtomicU64,
    terminated: watch::Sender<bool>,
    stats: StatsRecorder,
}

impl ExecutorInner {
    fn state(&self) -> u8 {
        self.state.load(Ordering::SeqCst)
    }

    /// Whether a child of `kind` may still start a run
    pub(crate) fn may_run(&self, kind: ChildKind) -> bool {
        if self.state() == RUNNING {
            return true;
        }
        match kind {
            ChildKind::Immediate => true,
            ChildKind::Delayed => self.config.execute_delayed_after_shutdown,
            ChildKind::Periodic => self.config.continue_periodic_after_shutdown,
        }
    }

    fn mark_terminated(&self) {
        self.state.store(TERMINATED, Ordering::SeqCst);
        self.terminated.send_replace(true);
        info!(executor = %self.config.name, "Executor terminated");
    }
}

/// Removes a finished child from the registry and records its outcome
///
/// Runs on drop so a panicking body still settles its future (as
/// cancelled) and still releases its tracker slot, in that order.
struct ChildGuard {
    inner: Arc<ExecutorInner>,
    id: u64,
    kind: ChildKind,
    handle: Arc<dyn CancelHandle>,
    _tracked: TaskTrackerToken,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.handle.is_done() {
            self.handle.cancel(true);
        }
        self.inner.children.remove(&self.id);
        let outcome = self.handle.outcome();
        self.inner.stats.record_outcome(outcome);
        debug!(
            executor = %self.inner.config.name,
            task_id = self.id,
            kind = ?self.kind,
            outcome = ?outcome,
            "Child finished"
        );
    }
}

/// Scheduled task executor bound to a tokio runtime
///
/// Cloning is cheap and every clone drives the same executor.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use cadence_executor::{Executor, TimeUnit};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), cadence_executor::ExecutorError> {
/// let executor = Executor::new(tokio::runtime::Handle::current());
///
/// let later = executor.schedule(|| async { Ok("done") }, Duration::from_millis(20))?;
/// assert!(later.get_delay(TimeUnit::Milliseconds) > 0);
/// assert_eq!(later.get().await?, "done");
///
/// executor.shutdown();
/// assert!(executor.await_termination(Duration::from_secs(1)).await);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Executor {
    /// Executor with default configuration on `dispatcher`, using tokio time
    pub fn new(dispatcher: Handle) -> Self {
        Self::from_parts(ExecutorConfig::default(), dispatcher, Arc::new(SystemClock))
    }

    /// Executor with default configuration reading time from `clock`
    pub fn with_clock(dispatcher: Handle, clock: Arc<dyn Clock>) -> Self {
        Self::from_parts(ExecutorConfig::default(), dispatcher, clock)
    }

    /// Create a new executor builder
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    fn from_parts(config: ExecutorConfig, dispatcher: Handle, clock: Arc<dyn Clock>) -> Self {
        let (terminated, _) = watch::channel(false);
        let origin = clock.now();
        debug!(executor = %config.name, "Executor created");
        Self {
            inner: Arc::new(ExecutorInner {
                config,
                dispatcher,
                clock,
                origin,
                state: AtomicU8::new(RUNNING),
                tracker: TaskTracker::new(),
                root: CancellationToken::new(),
                children: DashMap::new(),
                next_id: AtomicU64::new(1),
                terminated,
                stats: StatsRecorder::default(),
            }),
        }
    }

    /// Name from the configuration
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    /// Clock every delay, period and timeout is measured on
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn state(&self) -> ExecutorState {
        ExecutorState::from_u8(self.inner.state())
    }

    /// Snapshot of the executor counters
    pub fn stats(&self) -> ExecutorStats {
        self.inner.stats.snapshot()
    }

    pub(crate) fn origin(&self) -> Instant {
        self.inner.origin
    }

    pub(crate) fn inner(&self) -> &Arc<ExecutorInner> {
        &self.inner
    }

    fn reject(&self) -> ExecutorError {
        self.inner.stats.record_rejected();
        warn!(executor = %self.name(), state = %self.state(), "Task rejected");
        ExecutorError::rejected(self.name())
    }

    /// Reserve a tracker slot for one child, unless shutdown has begun
    pub(crate) fn admit(&self) -> ExecutorResult<Admission> {
        // The slot is taken before the state check so a concurrent shutdown
        // either sees it or rejects us.
        let tracked = self.inner.tracker.token();
        if self.inner.state() != RUNNING {
            drop(tracked);
            return Err(self.reject());
        }
        Ok(Admission {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            token: self.inner.root.child_token(),
            tracked,
        })
    }

    pub(crate) fn ensure_running(&self) -> ExecutorResult<()> {
        if self.inner.state() == RUNNING {
            Ok(())
        } else {
            Err(self.reject())
        }
    }

    /// Register and spawn one child on the dispatcher
    pub(crate) fn spawn_child<T, W>(
        &self,
        admission: Admission,
        kind: ChildKind,
        completion: Arc<Completion<T>>,
        work: W,
    ) where
        T: Send + Sync + 'static,
        W: Future<Output = ()> + Send + 'static,
    {
        let Admission { id, tracked, .. } = admission;
        let handle: Arc<dyn CancelHandle> = completion;
        self.inner.children.insert(id, ChildEntry { cancel: Arc::clone(&handle), kind });
        self.inner.stats.record_submitted();

        let guard =
            ChildGuard { inner: Arc::clone(&self.inner), id, kind, handle, _tracked: tracked };
        self.inner.dispatcher.spawn(async move {
            let guard = guard;
            debug!(
                executor = %guard.inner.config.name,
                task_id = id,
                kind = ?kind,
                "Child started"
            );
            work.await;
            drop(guard);
        });
    }

    fn spawn_one_shot<T>(&self, body: BoxCallable<T>) -> ExecutorResult<TaskFuture<T>>
    where
        T: Send + Sync + 'static,
    {
        let admission = self.admit()?;
        let completion = Arc::new(Completion::new(admission.token()));
        let future = TaskFuture::new(Arc::clone(&completion), Arc::clone(&self.inner.clock));

        let cell = Arc::clone(&completion);
        self.spawn_child(admission, ChildKind::Immediate, completion, async move {
            let result = run_guarded(&cell, move || body.call()).await;
            cell.finish(result);
        });
        Ok(future)
    }

    /// Run `task` once, discarding its result
    ///
    /// A failure is logged at `warn` and otherwise dropped.
    ///
    /// # Errors
    ///
    /// `Rejected` after shutdown.
    pub fn execute<F, Fut>(&self, task: F) -> ExecutorResult<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<()>> + Send + 'static,
    {
        let name = self.inner.config.name.clone();
        let body: BoxCallable<()> = Box::new(move || async move {
            let result = task().await;
            if let Err(err) = &result {
                warn!(executor = %name, error = %err, "Fire-and-forget task failed");
            }
            result
        });
        self.spawn_one_shot(body).map(drop)
    }

    /// Run `task` once and hand back a future for its value
    ///
    /// # Errors
    ///
    /// `Rejected` after shutdown.
    pub fn submit<T, F, Fut>(&self, task: F) -> ExecutorResult<TaskFuture<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<T>> + Send + 'static,
    {
        self.spawn_one_shot(Box::new(task))
    }

    /// Run an already boxed task once
    ///
    /// # Errors
    ///
    /// `Rejected` after shutdown.
    pub fn submit_boxed<T>(&self, task: BoxCallable<T>) -> ExecutorResult<TaskFuture<T>>
    where
        T: Send + Sync + 'static,
    {
        self.spawn_one_shot(task)
    }

    /// Run `task` once; the future yields `value` when it succeeds
    ///
    /// # Errors
    ///
    /// `Rejected` after shutdown.
    pub fn submit_with_result<T, F, Fut>(&self, task: F, value: T) -> ExecutorResult<TaskFuture<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<()>> + Send + 'static,
    {
        self.spawn_one_shot(Box::new(move || async move { task().await.map(|()| value) }))
    }

    /// Stop accepting tasks and let accepted ones finish
    ///
    /// Idempotent. Applies the configured shutdown policies to delayed and
    /// periodic tasks that have not started their next run.
    #[instrument(skip(self), fields(executor = %self.name()))]
    pub fn shutdown(&self) {
        if !self.begin_shutdown() {
            return;
        }
        info!("Executor shutting down");
        self.apply_shutdown_policies();
        self.begin_drain();
    }

    /// Stop accepting tasks and cancel every child
    ///
    /// Every outstanding future reports done and cancelled when this
    /// returns. Children are never queued, so the list of tasks that never
    /// started is always empty.
    #[instrument(skip(self), fields(executor = %self.name()))]
    pub fn shutdown_now(&self) -> Vec<BoxRunnable> {
        let transitioned = self.begin_shutdown();
        let mut cancelled = 0_usize;
        for entry in self.inner.children.iter() {
            if entry.cancel.cancel(true) {
                cancelled += 1;
            }
        }
        self.inner.root.cancel();
        info!(cancelled, "Executor shut down immediately");
        if transitioned {
            self.begin_drain();
        }
        Vec::new()
    }

    /// True once a shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.inner.state() != RUNNING
    }

    /// True once shut down and every accepted task finished
    pub fn is_terminated(&self) -> bool {
        self.inner.state() == TERMINATED
    }

    /// Wait until terminated, for at most `timeout` on the executor clock
    ///
    /// Returns whether the executor terminated.
    #[instrument(skip(self), fields(executor = %self.name()))]
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let mut terminated = self.inner.terminated.subscribe();
        tokio::select! {
            biased;
            () = async {
                let _ = terminated.wait_for(|done| *done).await;
            } => true,
            () = self.inner.clock.sleep(timeout) => self.is_terminated(),
        }
    }

    fn begin_shutdown(&self) -> bool {
        self.inner
            .state
            .compare_exchange(RUNNING, DRAINING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn apply_shutdown_policies(&self) {
        let config = &self.inner.config;
        let cancel_delayed = !config.execute_delayed_after_shutdown;
        let cancel_periodic = !config.continue_periodic_after_shutdown;
        if !cancel_delayed && !cancel_periodic {
            return;
        }

        for entry in self.inner.children.iter() {
            let affected = match entry.kind {
                ChildKind::Immediate => false,
                ChildKind::Delayed => cancel_delayed,
                ChildKind::Periodic => cancel_periodic,
            };
            // A run in progress is left alone; the loop stops after it.
            if affected && entry.cancel.cancel(false) {
                debug!(task_id = *entry.key(), kind = ?entry.kind, "Cancelled by shutdown policy");
            }
        }
    }

    fn begin_drain(&self) {
        self.inner.tracker.close();
        if self.inner.tracker.is_empty() {
            self.inner.mark_terminated();
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.inner.dispatcher.spawn(async move {
            inner.tracker.wait().await;
            inner.mark_terminated();
        });
    }
}

/// Run one body under the future's cancellation token
///
/// The body is only created once the future is flagged as running, so a
/// future cancelled beforehand never starts it. `None` means cancellation
/// won.
pub(crate) async fn run_guarded<C, T, F>(
    completion: &Completion<C>,
    start: F,
) -> Option<TaskResult<T>>
where
    F: FnOnce() -> futures::future::BoxFuture<'static, TaskResult<T>>,
{
    if !completion.begin_run() {
        return None;
    }
    let token = completion.token().clone();
    let result = tokio::select! {
        biased;
        () = token.cancelled() => None,
        result = start() => Some(result),
    };
    completion.end_run();
    result
}

/// Lifecycle control shared by executor implementations
#[async_trait]
pub trait ExecutorLifecycle: Send + Sync {
    /// Stop accepting tasks and let accepted ones finish
    fn shutdown(&self);

    /// Stop accepting tasks and cancel running ones
    fn shutdown_now(&self) -> Vec<BoxRunnable>;

    fn is_shutdown(&self) -> bool;

    fn is_terminated(&self) -> bool;

    /// Wait for termination; false if `timeout` elapsed first
    async fn await_termination(&self, timeout: Duration) -> bool;
}

#[async_trait]
impl ExecutorLifecycle for Executor {
    fn shutdown(&self) {
        Executor::shutdown(self);
    }

    fn shutdown_now(&self) -> Vec<BoxRunnable> {
        Executor::shutdown_now(self)
    }

    fn is_shutdown(&self) -> bool {
        Executor::is_shutdown(self)
    }

    fn is_terminated(&self) -> bool {
        Executor::is_terminated(self)
    }

    async fn await_termination(&self, timeout: Duration) -> bool {
        Executor::await_termination(self, timeout).await
    }
}

/// Builder for Executor
///
/// The dispatcher defaults to the runtime the builder is called from.
#[derive(Default)]
pub struct ExecutorBuilder {
    config: ExecutorConfig,
    dispatcher: Option<Handle>,
    clock: Option<Arc<dyn Clock>>,
}

impl fmt::Debug for ExecutorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorBuilder")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher.is_some())
            .field("clock", &self.clock.is_some())
            .finish()
    }
}

impl ExecutorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn continue_periodic_after_shutdown(mut self, keep: bool) -> Self {
        self.config.continue_periodic_after_shutdown = keep;
        self
    }

    pub fn execute_delayed_after_shutdown(mut self, keep: bool) -> Self {
        self.config.execute_delayed_after_shutdown = keep;
        self
    }

    pub fn dispatcher(mut self, dispatcher: Handle) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and create the executor
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is invalid, or if no dispatcher was
    /// given and the caller is not inside a tokio runtime.
    pub fn build(self) -> ExecutorResult<Executor> {
        self.config.validate()?;
        let dispatcher = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => Handle::try_current().map_err(|err| ExecutorError::Config {
                message: format!("no dispatcher given and no tokio runtime running: {err}"),
            })?,
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        Ok(Executor::from_parts(self.config, dispatcher, clock))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for executor lifecycle and one-shot submission.
    use std::sync::atomic::AtomicUsize;

    use cadence_common::testing::settle;
    use cadence_common::time::MockClock;

    use super::*;
    use crate::task::BoxError;

    fn executor() -> Executor {
        Executor::new(Handle::current())
    }

    /// Validates a submitted task's value reaches its future.
    #[tokio::test]
    async fn test_submit_returns_value() {
        let executor = executor();
        let future = executor.submit(|| async { Ok(String::from("ok")) }).unwrap();

        assert_eq!(future.get().await.unwrap(), "ok");
        assert_eq!(executor.stats().submitted, 1);
    }

    /// Validates `submit_with_result` maps success to the supplied value.
    #[tokio::test]
    async fn test_submit_with_result() {
        let executor = executor();
        let future = executor.submit_with_result(|| async { Ok(()) }, 11_u8).unwrap();

        assert_eq!(future.get().await.unwrap(), 11);
    }

    /// Validates a failing body completes its future exceptionally.
    #[tokio::test]
    async fn test_failure_captured_at_future() {
        let executor = executor();
        let future =
            executor.submit(|| async { Err::<u8, _>(BoxError::from("bad input")) }).unwrap();

        let err = future.get().await.unwrap_err();
        assert!(matches!(err, ExecutorError::Execution { .. }));
        assert!(!future.is_cancelled());
    }

    /// Validates `execute` runs the body and counts a failure.
    #[tokio::test]
    async fn test_execute_fire_and_forget() {
        let executor = executor();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        executor
            .execute(move || async move {
                hits_clone.fetch_add(1, Ordering::SeqCst);
                Err(BoxError::from("ignored"))
            })
            .unwrap();

        executor.shutdown();
        assert!(executor.await_termination(Duration::from_secs(5)).await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(executor.stats().failed, 1);
    }

    /// Validates state transitions and the idle fast path.
    ///
    /// Assertions:
    /// - Ensures an idle executor terminates on `shutdown()` at once.
    /// - Ensures repeated shutdown calls are harmless.
    #[tokio::test]
    async fn test_idle_shutdown_terminates_immediately() {
        let executor = executor();
        assert_eq!(executor.state(), ExecutorState::Running);

        executor.shutdown();
        executor.shutdown();

        assert!(executor.is_shutdown());
        assert!(executor.is_terminated());
        assert!(executor.await_termination(Duration::ZERO).await);
    }

    /// Validates submissions after shutdown are rejected synchronously.
    #[tokio::test]
    async fn test_rejects_after_shutdown() {
        let executor = executor();
        executor.shutdown();

        let err = executor.submit(|| async { Ok(1) }).unwrap_err();
        assert!(matches!(err, ExecutorError::Rejected { ref executor } if executor == "cadence"));
        assert_eq!(executor.stats().rejected, 1);
        assert_eq!(executor.stats().submitted, 0);
    }

    /// Validates `await_termination` times out on the injected clock.
    #[tokio::test]
    async fn test_await_termination_times_out_on_mock_clock() {
        let clock = MockClock::new();
        let executor = Executor::with_clock(Handle::current(), Arc::new(clock.clone()));
        let _pending = executor.submit(|| std::future::pending::<TaskResult<()>>()).unwrap();
        executor.shutdown();

        let waiter = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.await_termination(Duration::from_secs(1)).await })
        };
        settle().await;
        clock.advance(Duration::from_secs(1));

        assert!(!waiter.await.unwrap());
        assert_eq!(executor.state(), ExecutorState::Draining);

        executor.shutdown_now();
        assert!(executor.await_termination(Duration::from_secs(1)).await);
    }

    /// Validates the builder falls back to the ambient runtime.
    #[tokio::test]
    async fn test_builder_uses_current_runtime() {
        let executor = Executor::builder().name("jobs").build().unwrap();
        assert_eq!(executor.name(), "jobs");

        let err = Executor::builder().name("").build().unwrap_err();
        assert!(matches!(err, ExecutorError::Config { .. }));
    }

    /// Validates building outside a runtime without a dispatcher fails.
    #[test]
    fn test_builder_without_runtime() {
        let err = Executor::builder().build().unwrap_err();
        assert!(matches!(err, ExecutorError::Config { .. }));
    }

    /// Validates the lifecycle trait is object safe and forwards calls.
    #[tokio::test]
    async fn test_lifecycle_trait_object() {
        let lifecycle: Box<dyn ExecutorLifecycle> = Box::new(executor());
        lifecycle.shutdown();

        assert!(lifecycle.is_shutdown());
        assert!(lifecycle.await_termination(Duration::from_millis(10)).await);
        assert!(lifecycle.shutdown_now().is_empty());
    }
}
