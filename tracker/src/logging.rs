//! Diagnostic tracing for the tracker binaries.
//!
//! Output goes to stderr and is controlled by `RUST_LOG`. Command results
//! are printed to stdout separately and are unaffected by the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, falling back to `default_filter` when unset.
///
/// # Example
/// ```bash
/// RUST_LOG=tracker=debug tracker status --test <id>
/// ```
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
