//! Logging Module
//!
//! Installs the tracing subscriber used by hosts and tests.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "enrichment_store=info";

/// Initializes a tracing subscriber with an env filter.
///
/// Defaults to `default_filter`, can be overridden with the RUST_LOG env var.
/// Returns false when a global subscriber was already installed, so it is safe
/// to call from every test.
pub fn init_tracing(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
