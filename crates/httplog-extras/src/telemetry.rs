//! Subscriber bootstrap

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (for example `"info,httplog=debug"`)
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing(default_directive: &str) {
    if let Err(e) = try_init_tracing(default_directive) {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}

/// Like [`init_tracing`], reporting whether installation failed
pub fn try_init_tracing(default_directive: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
