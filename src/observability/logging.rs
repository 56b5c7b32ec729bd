//! # Structured Logging
//!
//! `tracing-subscriber` setup and span helpers. Secret values never reach a
//! log line: fields carry key names, providers and outcomes only.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Error, Result};

/// Create a tracing span for one broker operation.
///
/// ```rust,ignore
/// let span = secret_span!("get", "jwt-secret");
/// let span = secret_span!("rotate", "api-key-stripe", actor = "ops");
/// ```
#[macro_export]
macro_rules! secret_span {
    ($operation:expr, $key:expr) => {
        tracing::debug_span!(
            "secret_operation",
            operation = %$operation,
            secret_key = %$key,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $key:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "secret_operation",
            operation = %$operation,
            secret_key = %$key,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over the configured level. Returns an error
/// when a subscriber is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logging {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| Error::internal(format!("Failed to install tracing subscriber: {e}")))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        provider = %config.broker.provider_kind(),
        environment = %config.broker.environment,
        cache_ttl_seconds = config.broker.cache_ttl_seconds,
        enforce_validation = config.broker.enforce_validation,
        metrics_enabled = config.observability.metrics_enabled(),
        json_logging = config.observability.json_logging,
        "Secret broker configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = secret_span!("get", "jwt-secret");
        let _span = secret_span!("rotate", "api-key-stripe", actor = "ops");
    }

    #[test]
    fn test_log_config_info() {
        log_config_info(&AppConfig::default());
    }
}
