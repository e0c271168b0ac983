//! Sets up structured logging for the engine
//!
//! This is a thin stand-in for Thorium's `utils::trace`, stripped of the opentelemetry/jaeger
//! exporter wiring since log/metrics transport is out of scope here; what remains is just the
//! `tracing-subscriber` fmt layer that every binary embedding this crate can install.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber that writes formatted events to stdout
///
/// Respects `RUST_LOG` if set, otherwise defaults to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    // a second call to init() in the same process (e.g. in tests) should not panic
    let _ = tracing::subscriber::set_global_default(subscriber);
}
