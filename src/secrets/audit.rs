//! Audit trail for broker operations.
//!
//! The broker emits exactly one [`AuditEvent`] per operation attempt,
//! successful or not. Events carry the secret key, never its value.
//!
//! Sinks are synchronous: recording must not suspend, so that a cache hit
//! stays free of await points. Sinks that ship events elsewhere should
//! buffer internally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Key recorded for operations that touch every entry.
pub const ALL_KEYS: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOperation {
    Get,
    Set,
    Delete,
    Rotate,
    Warmup,
    Clear,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Rotate => "rotate",
            Self::Warmup => "warmup",
            Self::Clear => "clear",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSource {
    Cache,
    Backend,
}

impl AuditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Backend => "backend",
        }
    }
}

impl fmt::Display for AuditSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one broker operation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation: AuditOperation,
    pub secret_key: String,
    pub source: AuditSource,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl AuditEvent {
    pub fn new(operation: AuditOperation, secret_key: impl Into<String>, source: AuditSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation,
            secret_key: secret_key.into(),
            source,
            success: true,
            error: None,
            actor: None,
        }
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    /// Keep the success flag but note the error that was absorbed.
    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn with_actor(mut self, actor: Option<String>) -> Self {
        self.actor = actor;
        self
    }
}

/// Receives audit events.
pub trait AuditSink: Send + Sync + fmt::Debug {
    fn record(&self, event: AuditEvent);
}

/// Writes each event as a structured `tracing` record on the
/// `secret_broker::audit` target, for log pipelines to pick up.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        if event.success {
            tracing::info!(
                target: "secret_broker::audit",
                audit_id = %event.id,
                timestamp = %event.timestamp.to_rfc3339(),
                operation = %event.operation,
                secret_key = %event.secret_key,
                source = %event.source,
                success = event.success,
                error = event.error.as_deref(),
                actor = event.actor.as_deref(),
                "secret audit event"
            );
        } else {
            tracing::warn!(
                target: "secret_broker::audit",
                audit_id = %event.id,
                timestamp = %event.timestamp.to_rfc3339(),
                operation = %event.operation,
                secret_key = %event.secret_key,
                source = %event.source,
                success = event.success,
                error = event.error.as_deref(),
                actor = event.actor.as_deref(),
                "secret audit event"
            );
        }
    }
}

/// Keeps events in memory. Used by tests and by embedders that inspect the trail.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn events_for(&self, operation: AuditOperation) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|event| event.operation == operation).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Debug, Clone, Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.record(event.clone());
        }
    }
}
