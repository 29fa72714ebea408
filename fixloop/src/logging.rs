//! Diagnostic tracing for the repair loop.
//!
//! Tracing output is controlled by `RUST_LOG` and goes to stderr. The
//! user-facing progress lines printed by the CLI are separate and always shown.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`.
///
/// # Example
/// ```bash
/// RUST_LOG=fixloop=debug fixloop src/regexp1.ts src/regexp1.test.ts
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
