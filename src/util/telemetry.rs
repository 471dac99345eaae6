//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVE: &str = "track_arbiter=info";

/// Initialize tracing/telemetry. Callers can install their own subscriber; this
/// helper installs an env-filtered fmt subscriber if none is set, falling back to
/// [`DEFAULT_LOG_DIRECTIVE`].
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
