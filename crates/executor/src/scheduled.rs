//! Futures for delayed and periodic work

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_common::time::{Clock, TimeUnit};

use crate::error::ExecutorResult;
use crate::future::{TaskFuture, TaskOutcome};

/// Anything that knows how long until it is due
pub trait Delayed {
    /// Remaining delay in `unit`; zero or negative once due
    fn get_delay(&self, unit: TimeUnit) -> i64;

    /// Absolute due time, when the implementor has one
    fn scheduled_at(&self) -> Option<Instant> {
        None
    }
}

/// Next scheduled execution time, stored as nanos past the executor origin
///
/// Only the scheduling loop writes it.
pub(crate) struct ScheduleMark {
    origin: Instant,
    offset_nanos: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl ScheduleMark {
    pub(crate) fn new(origin: Instant, at: Instant, clock: Arc<dyn Clock>) -> Self {
        let mark = Self { origin, offset_nanos: AtomicU64::new(0), clock };
        mark.set(at);
        mark
    }

    pub(crate) fn get(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_nanos.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, at: Instant) {
        let nanos = at.saturating_duration_since(self.origin).as_nanos();
        self.offset_nanos.store(u64::try_from(nanos).unwrap_or(u64::MAX), Ordering::Release);
    }

    fn delay_nanos(&self) -> i128 {
        let at = self.get();
        let now = self.clock.now();
        if at >= now {
            nanos_i128(at - now)
        } else {
            -nanos_i128(now - at)
        }
    }
}

fn nanos_i128(duration: Duration) -> i128 {
    i128::try_from(duration.as_nanos()).unwrap_or(i128::MAX)
}

/// A [`TaskFuture`] that also reports when its task is next due
///
/// Ordering and equality compare scheduled times only.
pub struct ScheduledFuture<T> {
    future: TaskFuture<T>,
    mark: Arc<ScheduleMark>,
}

impl<T> Clone for ScheduledFuture<T> {
    fn clone(&self) -> Self {
        Self { future: self.future.clone(), mark: Arc::clone(&self.mark) }
    }
}

impl<T> fmt::Debug for ScheduledFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledFuture")
            .field("outcome", &self.outcome())
            .field("delay_ms", &self.get_delay(TimeUnit::Milliseconds))
            .finish()
    }
}

impl<T> ScheduledFuture<T> {
    pub(crate) fn new(future: TaskFuture<T>, mark: Arc<ScheduleMark>) -> Self {
        Self { future, mark }
    }

    pub(crate) fn mark(&self) -> &Arc<ScheduleMark> {
        &self.mark
    }

    /// Time left until the next execution, negative once overdue
    ///
    /// Keeps decreasing after the future is cancelled or completes.
    pub fn get_delay(&self, unit: TimeUnit) -> i64 {
        unit.from_nanos_i128(self.mark.delay_nanos())
    }

    /// Instant of the next (or last) scheduled execution
    pub fn scheduled_at(&self) -> Instant {
        self.mark.get()
    }

    /// Order against any other [`Delayed`] item
    ///
    /// Uses absolute times when the other side exposes one, otherwise the
    /// materialized delays in nanoseconds.
    pub fn compare_delayed(&self, other: &dyn Delayed) -> CmpOrdering {
        match other.scheduled_at() {
            Some(at) => self.scheduled_at().cmp(&at),
            None => self
                .get_delay(TimeUnit::Nanoseconds)
                .cmp(&other.get_delay(TimeUnit::Nanoseconds)),
        }
    }

    /// The plain future view of this handle
    pub fn as_task_future(&self) -> &TaskFuture<T> {
        &self.future
    }

    /// See [`TaskFuture::cancel`]
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.future.cancel(may_interrupt)
    }

    pub fn is_done(&self) -> bool {
        self.future.is_done()
    }

    pub fn is_cancelled(&self) -> bool {
        self.future.is_cancelled()
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.future.outcome()
    }
}

impl<T: Clone> ScheduledFuture<T> {
    /// See [`TaskFuture::get`]
    pub async fn get(&self) -> ExecutorResult<T> {
        self.future.get().await
    }

    /// See [`TaskFuture::get_timeout`]
    pub async fn get_timeout(&self, timeout: Duration) -> ExecutorResult<T> {
        self.future.get_timeout(timeout).await
    }

    /// See [`TaskFuture::blocking_get`]
    pub fn blocking_get(&self) -> ExecutorResult<T> {
        self.future.blocking_get()
    }
}

impl<T> Delayed for ScheduledFuture<T> {
    fn get_delay(&self, unit: TimeUnit) -> i64 {
        ScheduledFuture::get_delay(self, unit)
    }

    fn scheduled_at(&self) -> Option<Instant> {
        Some(self.mark.get())
    }
}

impl<T> PartialEq for ScheduledFuture<T> {
    fn eq(&self, other: &Self) -> bool {
        self.scheduled_at() == other.scheduled_at()
    }
}

impl<T> Eq for ScheduledFuture<T> {}

impl<T> PartialOrd for ScheduledFuture<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ScheduledFuture<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.scheduled_at().cmp(&other.scheduled_at())
    }
}
