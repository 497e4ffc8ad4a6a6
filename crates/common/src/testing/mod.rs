//! Testing utilities and helpers
//!
//! - **[`async_utils`]**: async assertions, polling and scheduler settling
//! - **[`logging`]**: one-shot `tracing-subscriber` setup for test binaries
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use cadence_common::testing::{init_test_tracing, settle};
//! use cadence_common::time::MockClock;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! init_test_tracing();
//! let clock = MockClock::new();
//! clock.advance(Duration::from_secs(5));
//! settle().await; // let woken tasks run before asserting
//! # }
//! ```

pub mod async_utils;
pub mod logging;

pub use self::async_utils::{advance_and_settle, poll_until, settle, timeout_ok};
pub use self::logging::init_test_tracing;
