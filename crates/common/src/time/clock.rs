//! Time sources for scheduling
//!
//! The executor never calls `Instant::now()` or `tokio::time::sleep`
//! directly: it reads and waits on a [`Clock`]. Production code uses
//! [`SystemClock`] (tokio time, so `tokio::time::pause` also applies);
//! tests inject a [`MockClock`] and drive time by hand.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use cadence_common::time::{Clock, MockClock};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let clock = MockClock::new();
//! let wake = clock.sleep(Duration::from_secs(30));
//!
//! // Nothing sleeps for real: advancing the clock releases the sleeper.
//! clock.advance(Duration::from_secs(30));
//! wake.await;
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::trace;

/// Future returned by [`Clock::sleep_until`]
pub type Sleep = BoxFuture<'static, ()>;

/// Trait for time operations to enable deterministic testing
///
/// Implementations must be monotonic: `now()` never goes backwards.
pub trait Clock: Send + Sync + 'static {
    /// Current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Future that resolves once `now() >= deadline`
    fn sleep_until(&self, deadline: Instant) -> Sleep;

    /// Future that resolves once `duration` has elapsed on this clock
    ///
    /// A duration too large to be represented as an instant never resolves.
    fn sleep(&self, duration: Duration) -> Sleep {
        match self.now().checked_add(duration) {
            Some(deadline) => self.sleep_until(deadline),
            None => Box::pin(std::future::pending()),
        }
    }
}

/// Implement Clock for Arc<T> where T: Clock for convenient cloning
impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep_until(&self, deadline: Instant) -> Sleep {
        (**self).sleep_until(deadline)
    }
}

/// Real clock backed by the tokio timer
///
/// Reads go through `tokio::time::Instant`, so a runtime started with
/// `start_paused = true` gives deterministic, auto-advancing time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep_until(&self, deadline: Instant) -> Sleep {
        Box::pin(tokio::time::sleep_until(deadline.into()))
    }
}

/// Mock clock for deterministic testing
///
/// Time only moves when [`MockClock::advance`] or
/// [`MockClock::set_elapsed`] is called. Pending sleeps are woken as soon
/// as the simulated time reaches their deadline. Clones share the same
/// timeline.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<watch::Sender<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self::with_current_time(Instant::now())
    }

    /// Create a new mock clock with a specific start time
    pub fn with_current_time(start: Instant) -> Self {
        let (elapsed, _) = watch::channel(Duration::ZERO);
        Self { start, elapsed: Arc::new(elapsed) }
    }

    /// Advance the mock clock by a duration, waking due sleepers
    pub fn advance(&self, duration: Duration) {
        self.elapsed.send_modify(|elapsed| *elapsed += duration);
        trace!(by = ?duration, elapsed = ?self.elapsed(), "Mock clock advanced");
    }

    /// Advance the mock clock by milliseconds (convenience method)
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the mock clock to a specific elapsed time
    ///
    /// Setting an elapsed time earlier than the current one is ignored to
    /// keep the clock monotonic.
    pub fn set_elapsed(&self, duration: Duration) {
        self.elapsed.send_if_modified(|elapsed| {
            if duration > *elapsed {
                *elapsed = duration;
                true
            } else {
                false
            }
        });
    }

    /// Simulated time since the clock was created
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.borrow()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep_until(&self, deadline: Instant) -> Sleep {
        let start = self.start;
        let mut elapsed = self.elapsed.subscribe();
        Box::pin(async move {
            let reached = elapsed.wait_for(|elapsed| start + *elapsed >= deadline).await.is_ok();
            if !reached {
                // Every handle to the clock is gone: time can no longer move.
                std::future::pending::<()>().await;
            }
        })
    }
}
