//! Tracing bootstrap shared by both binaries.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber reading `RUST_LOG`, defaulting to `info`.
///
/// Safe to call once per process; a second call is a no-op (the global
/// subscriber can only be set once, and we don't treat that as fatal here).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
