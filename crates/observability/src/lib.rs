//! Process-wide logging setup for changeflow services.

/// Subscriber construction.
pub mod subscriber;

pub use subscriber::{DEFAULT_DIRECTIVE, init, init_for_tests, init_with};
