//! Logging setup
//!
//! The engine only emits `tracing` events; installing a subscriber is left
//! to the caller. These helpers cover the common cases. Both use `try_init`,
//! so calling them from several tests is harmless.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directive, e.g. `stateful_check=debug`.
pub const LOG_ENV: &str = "STATEFUL_CHECK_LOG";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Human-readable output, captured by the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_test_writer()
        .try_init();
}

/// JSON lines, for CI log collection.
pub fn init_json_tracing() {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter())
        .try_init();
}
