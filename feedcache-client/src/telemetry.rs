//! Tracing subscriber setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::ClientError;

/// Environment variable holding `EnvFilter` directives. Overrides the
/// configured filter when set.
pub const LOG_ENV_VAR: &str = "FEEDCACHE_LOG";

/// Build the filter: `FEEDCACHE_LOG` if set and valid, else the config's.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(&config.filter))
}

/// Install the global subscriber. Call once at startup; a second call fails.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ClientError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| ClientError::Telemetry(e.to_string()))?;

    tracing::info!(filter = %config.filter, json = config.json, "Telemetry initialized");
    Ok(())
}
