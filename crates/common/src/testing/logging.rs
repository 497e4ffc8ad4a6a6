//! Tracing setup for tests

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a test-friendly `tracing` subscriber once per process
///
/// Output goes through the libtest capture writer, so it only shows for
/// failing tests. The filter comes from `RUST_LOG` and defaults to debug
/// for the Cadence crates.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cadence_executor=debug,cadence_common=debug"));
        // Another subscriber may already be installed by the test binary.
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}
