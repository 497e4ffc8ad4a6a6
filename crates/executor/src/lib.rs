//! Scheduled task execution on top of a tokio runtime.
//!
//! [`Executor`] accepts one-shot work ([`Executor::execute`],
//! [`Executor::submit`]), delayed and periodic work
//! ([`Executor::schedule`], [`Executor::schedule_at_fixed_rate`],
//! [`Executor::schedule_with_fixed_delay`]) and batches
//! ([`Executor::invoke_all`], [`Executor::invoke_any`]). Results come back
//! through [`TaskFuture`] and [`ScheduledFuture`] handles that support
//! cooperative cancellation and bounded waits.
//!
//! The executor does not own threads. It is handed a
//! [`tokio::runtime::Handle`] to spawn on and a
//! [`Clock`](cadence_common::time::Clock) to measure time with.
//!
//! ```
//! use std::time::Duration;
//!
//! use cadence_executor::Executor;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() -> Result<(), cadence_executor::ExecutorError> {
//! let executor = Executor::builder().name("heartbeat").build()?;
//!
//! let beat = executor.schedule_at_fixed_rate(
//!     || async { Ok(()) },
//!     Duration::ZERO,
//!     Duration::from_millis(100),
//! )?;
//! tokio::time::sleep(Duration::from_millis(450)).await;
//!
//! executor.shutdown_now();
//! assert!(beat.is_cancelled());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod config;
pub mod error;
mod executor;
pub mod future;
pub mod scheduled;
pub mod stats;
pub mod task;

pub use cadence_common::time::TimeUnit;
pub use config::{ExecutorConfig, ExecutorConfigBuilder};
pub use error::{ExecutorError, ExecutorResult, TaskCause};
pub use executor::{Executor, ExecutorBuilder, ExecutorLifecycle, ExecutorState};
pub use future::{TaskFuture, TaskOutcome};
pub use scheduled::{Delayed, ScheduledFuture};
pub use stats::ExecutorStats;
pub use task::{
    callable, runnable, BoxCallable, BoxError, BoxRunnable, Callable, Runnable, TaskResult,
};
