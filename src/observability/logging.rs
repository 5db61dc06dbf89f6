//! Structured logging.
//!
//! # Responsibilities
//! - Initialize a tracing subscriber for binaries and tests
//! - Respect `RUST_LOG`, falling back to the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install a global fmt subscriber. Later calls are ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let fallback = format!("timeout_client={}", config.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(log_level = %config.log_level, "Logging initialized");
    }
}
