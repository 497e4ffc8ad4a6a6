//! Delayed and periodic scheduling
//!
//! Each scheduled task is a single child that sleeps on the executor clock
//! until its mark, runs, and (for periodic work) computes the next mark:
//!
//! - fixed rate: `max(previous mark + period, now)`, so a fast body never
//!   drifts and an overrun causes one immediate re-fire rather than a
//!   backlog of missed runs
//! - fixed delay: `completion + delay`
//!
//! Every wait races the child's cancellation token.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_common::time::Clock;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{run_guarded, ChildKind, Executor};
use crate::error::{ExecutorError, ExecutorResult};
use crate::future::{Completion, TaskFuture};
use crate::scheduled::{ScheduleMark, ScheduledFuture};
use crate::task::{RepeatingTask, TaskResult};

#[derive(Debug, Clone, Copy)]
enum Cadence {
    FixedRate(Duration),
    FixedDelay(Duration),
}

impl Cadence {
    fn next_mark(self, fired_at: Instant, now: Instant) -> Option<Instant> {
        match self {
            Self::FixedRate(period) => fired_at.checked_add(period).map(|next| next.max(now)),
            Self::FixedDelay(delay) => now.checked_add(delay),
        }
    }
}

/// Sleep until `at`; false if `token` fired first
async fn wait_until(clock: &dyn Clock, at: Instant, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = token.cancelled() => false,
        () = clock.sleep_until(at) => true,
    }
}

impl Executor {
    fn mark_after(&self, delay: Duration) -> ExecutorResult<Instant> {
        self.clock().now().checked_add(delay).ok_or_else(|| {
            ExecutorError::invalid_argument(format!("delay {delay:?} is too large to schedule"))
        })
    }

    /// Run `task` once after `delay`
    ///
    /// The scheduled time is fixed at submission plus `delay`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the delay cannot be represented, `Rejected`
    /// after shutdown.
    pub fn schedule<T, F, Fut>(
        &self,
        task: F,
        delay: Duration,
    ) -> ExecutorResult<ScheduledFuture<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<T>> + Send + 'static,
    {
        let at = self.mark_after(delay)?;
        let admission = self.admit()?;
        let clock = Arc::clone(self.clock());
        let completion = Arc::new(Completion::new(admission.token()));
        let mark = Arc::new(ScheduleMark::new(self.origin(), at, Arc::clone(&clock)));
        let future = ScheduledFuture::new(
            TaskFuture::new(Arc::clone(&completion), Arc::clone(&clock)),
            mark,
        );

        let inner = Arc::clone(self.inner());
        let cell = Arc::clone(&completion);
        self.spawn_child(admission, ChildKind::Delayed, completion, async move {
            if !wait_until(clock.as_ref(), at, cell.token()).await
                || !inner.may_run(ChildKind::Delayed)
            {
                cell.mark_cancelled();
                return;
            }
            let result = run_guarded(&cell, move || task().boxed()).await;
            cell.finish(result);
        });
        Ok(future)
    }

    /// Run `task` every `period`, first after `initial_delay`
    ///
    /// Firings are anchored to the first mark, so a body shorter than the
    /// period starts exactly every `period`. A body that overruns is
    /// re-fired once as soon as it returns. The future only settles when the
    /// schedule stops: cancelled, or failed with the error of the first
    /// failing run.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero period, `Rejected` after shutdown.
    #[instrument(skip(self, task), fields(executor = %self.name()))]
    pub fn schedule_at_fixed_rate<F, Fut>(
        &self,
        task: F,
        initial_delay: Duration,
        period: Duration,
    ) -> ExecutorResult<ScheduledFuture<()>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<()>> + Send + 'static,
    {
        if period.is_zero() {
            return Err(ExecutorError::invalid_argument("period must be greater than zero"));
        }
        self.schedule_periodic(task, initial_delay, Cadence::FixedRate(period))
    }

    /// Run `task` repeatedly, waiting `delay` after each run finishes
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a zero delay, `Rejected` after shutdown.
    #[instrument(skip(self, task), fields(executor = %self.name()))]
    pub fn schedule_with_fixed_delay<F, Fut>(
        &self,
        task: F,
        initial_delay: Duration,
        delay: Duration,
    ) -> ExecutorResult<ScheduledFuture<()>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<()>> + Send + 'static,
    {
        if delay.is_zero() {
            return Err(ExecutorError::invalid_argument("delay must be greater than zero"));
        }
        self.schedule_periodic(task, initial_delay, Cadence::FixedDelay(delay))
    }

    fn schedule_periodic<R: RepeatingTask>(
        &self,
        task: R,
        initial_delay: Duration,
        cadence: Cadence,
    ) -> ExecutorResult<ScheduledFuture<()>> {
        let first = self.mark_after(initial_delay)?;
        let admission = self.admit()?;
        let clock = Arc::clone(self.clock());
        let completion = Arc::new(Completion::new(admission.token()));
        let mark = Arc::new(ScheduleMark::new(self.origin(), first, Arc::clone(&clock)));
        let future = ScheduledFuture::new(
            TaskFuture::new(Arc::clone(&completion), Arc::clone(&clock)),
            Arc::clone(&mark),
        );

        let inner = Arc::clone(self.inner());
        let cell = Arc::clone(&completion);
        let name = self.name().to_string();
        self.spawn_child(admission, ChildKind::Periodic, completion, async move {
            let mut task = task;
            let mut runs = 0_u64;
            loop {
                let at = mark.get();
                if !inner.may_run(ChildKind::Periodic)
                    || !wait_until(clock.as_ref(), at, cell.token()).await
                    || !inner.may_run(ChildKind::Periodic)
                {
                    cell.mark_cancelled();
                    return;
                }

                runs += 1;
                debug!(executor = %name, run = runs, ?cadence, "Periodic task firing");
                match run_guarded(&cell, || task.run()).await {
                    Some(Ok(())) => {}
                    Some(Err(err)) => {
                        debug!(executor = %name, run = runs, error = %err, "Periodic task failed");
                        cell.fail(err);
                        return;
                    }
                    None => {
                        cell.mark_cancelled();
                        return;
                    }
                }

                match cadence.next_mark(at, clock.now()) {
                    Some(next) => mark.set(next),
                    None => {
                        // Next run lies beyond the representable future.
                        cell.token().cancelled().await;
                        cell.mark_cancelled();
                        return;
                    }
                }
            }
        });
        Ok(future)
    }
}
