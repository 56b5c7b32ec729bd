//! # Metrics Collection
//!
//! Counters and histograms for the broker, recorded through the `metrics`
//! facade. Without an installed exporter the calls are no-ops.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Metrics recorder for broker activity
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record how a read was answered (cached, fresh, stale, absent, unavailable).
    pub fn record_lookup(&self, outcome: &'static str) {
        let labels = [("outcome", outcome.to_string())];
        counter!("secret_broker_lookups_total", &labels).increment(1);
    }

    /// Record one call into the secret store
    pub fn record_store_call(&self, operation: &str, success: bool, duration: f64) {
        let status = if success { "success" } else { "error" };
        let labels = [("operation", operation.to_string()), ("status", status.to_string())];
        counter!("secret_broker_store_calls_total", &labels).increment(1);

        let duration_labels = [("operation", operation.to_string())];
        histogram!("secret_broker_store_call_duration_seconds", &duration_labels).record(duration);
    }

    pub fn record_audit_event(&self, operation: &str, success: bool) {
        let labels = [("operation", operation.to_string()), ("success", success.to_string())];
        counter!("secret_broker_audit_events_total", &labels).increment(1);
    }

    pub fn update_cache_entries(&self, entries: usize) {
        gauge!("secret_broker_cache_entries").set(entries as f64);
    }

    pub fn register_broker_metrics(&self) {
        describe_counter!(
            "secret_broker_lookups_total",
            Unit::Count,
            "Secret reads by outcome (cached, fresh, stale, absent, unavailable)"
        );
        describe_counter!(
            "secret_broker_store_calls_total",
            Unit::Count,
            "Calls into the secret store by operation and status"
        );
        describe_histogram!(
            "secret_broker_store_call_duration_seconds",
            Unit::Seconds,
            "Secret store call latency"
        );
        describe_counter!("secret_broker_audit_events_total", Unit::Count, "Audit events emitted");
        describe_gauge!("secret_broker_cache_entries", Unit::Count, "Entries held in the secret cache");
    }
}

/// Install the Prometheus exporter when a metrics port is configured.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no metrics port configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register_broker_metrics();

    info!(metrics_addr = %metrics_addr, service_name = %config.service_name, "Metrics collection initialized");
    Ok(())
}
