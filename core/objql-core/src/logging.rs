//! tracing 초기화 헬퍼
//!
//! Planner events are emitted under the `objql::optimizer` and
//! `objql::catalog` targets. Without the `logging` feature every
//! function here is a no-op.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is unset: `level` for objql targets only.
pub fn default_directive(level: &str) -> String {
    format!("objql={level}")
}

/// Install a subscriber at `info`.
///
/// ```rust
/// objql_core::logging::init();
/// ```
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Install a subscriber at `level` unless `RUST_LOG` says otherwise.
/// `RUST_LOG=objql::optimizer=trace` shows the cost of every join order.
/// A second call leaves the first subscriber in place.
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .try_init();
}

/// Planner traces captured by the test harness.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new(default_directive("trace")))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
