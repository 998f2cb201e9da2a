//! Tracing subscriber initialization.
//!
//! Installs a [`tracing_subscriber`] registry with an `EnvFilter` and a
//! `fmt` layer, human-readable or JSON depending on configuration.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Build the event filter. `RUST_LOG` wins over the configured directives;
/// invalid directives fall back to `info`.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber.
///
/// Calling this twice leaves the first subscriber in place.
pub fn init(config: &LoggingConfig) {
    let filter = env_filter(config);
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}
