//! Diagnostic tracing for the harness itself.
//!
//! Harness diagnostics go through `tracing` and end up on stderr, filtered by
//! `RUST_LOG`. The per-level files written by [`crate::LogSink`] are a
//! separate product log and are unaffected by the filter.

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT_TEST_LOGGING: Once = Once::new();

/// Install a compact stderr subscriber. Reads `RUST_LOG`, defaulting to `warn`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .is_ok()
}

/// Install a test-writer subscriber once, only when `TEST_LOG` is set.
pub fn init_for_tests() {
    INIT_TEST_LOGGING.call_once(|| {
        if std::env::var("TEST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(
                    std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()),
                )
                .try_init();
        }
    });
}
