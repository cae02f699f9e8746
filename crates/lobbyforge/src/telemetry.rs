//! Tracing setup for binaries and tests that embed the engine.

use tracing_subscriber::EnvFilter;

/// Installs a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (for example `"info"` or `"lobbyforge=debug"`).
///
/// Returns `false` when a global subscriber was already installed; the
/// existing one stays in place.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_target(true)
        .try_init()
        .is_ok()
}
