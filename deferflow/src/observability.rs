//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::errors::ConfigError;

/// Installs a global `tracing` subscriber using `config`.
///
/// Fails instead of panicking if the filter is invalid or a subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|err| ConfigError::Filter {
        filter: config.filter.clone(),
        reason: err.to_string(),
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|err| ConfigError::Subscriber(err.to_string()))
}
