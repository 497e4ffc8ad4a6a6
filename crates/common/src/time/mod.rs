//! Time utilities and abstractions
//!
//! - **[`unit`]**: `TimeUnit` conversions between nanoseconds and days
//! - **[`clock`]**: time sources the executor reads and sleeps on (real and
//!   mock)
//!
//! ## Usage
//!
//! ```rust
//! # #[cfg(feature = "runtime")]
//! # {
//! use std::time::Duration;
//!
//! use cadence_common::time::{Clock, MockClock, TimeUnit};
//!
//! assert_eq!(TimeUnit::Seconds.convert(2, TimeUnit::Minutes), 120);
//!
//! // Mock time for testing
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now() - start, Duration::from_secs(5));
//! # }
//! ```

#[cfg(feature = "runtime")]
pub mod clock;
pub mod unit;

#[cfg(feature = "runtime")]
pub use clock::{Clock, MockClock, Sleep, SystemClock};
pub use unit::TimeUnit;
