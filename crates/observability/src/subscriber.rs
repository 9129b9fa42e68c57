//! JSON structured logging via `tracing-subscriber`.
//!
//! The filter comes from `RUST_LOG` when set. Every initializer is safe to
//! call more than once; only the first call installs a subscriber.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Install JSON logging with the default filter.
pub fn init() {
    init_with(DEFAULT_DIRECTIVE);
}

/// Install JSON logging, falling back to `directive` when `RUST_LOG` is unset.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_with(directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_current_span(false)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Human-readable logs routed through the test harness's capture.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
