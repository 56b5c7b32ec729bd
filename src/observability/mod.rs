//! # Observability Infrastructure
//!
//! Structured logging and metrics for the secret broker. The audit trail
//! itself lives in [`crate::secrets::audit`].

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::{init_metrics, MetricsRecorder};

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging, then metrics if a port is configured.
pub async fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;

    if config.metrics_enabled() {
        init_metrics(config)?;
    }

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        metrics_enabled = config.metrics_enabled(),
        "Observability initialized successfully"
    );

    Ok(())
}
