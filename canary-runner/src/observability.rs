//! Logging initialization.

use tracing_subscriber::filter::EnvFilter;

use crate::config::Config;

/// Initializes the tracing subscriber.
///
/// The `RUST_LOG` environment variable takes precedence over the configured
/// log level.
pub fn init_tracing(config: &Config) {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => EnvFilter::new(value),
        Err(_) => EnvFilter::default().add_directive(config.logging.level.into()),
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_env_filter(filter)
        .init();
}
