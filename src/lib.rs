pub mod collector;
pub mod config;
pub mod error;
pub mod exemplar;
pub mod handlers;
pub mod labels;
pub mod metrics;
pub mod record;
pub mod relabel;
pub mod server;
pub mod signals;
pub mod watcher;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` takes precedence over the configured `level`. `format` is
/// either `"json"` or plain text.
///
/// Note: This function can only be called once per process.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
