//! Tracing setup for binaries and tests embedding the compiler.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global tracing subscriber, honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
