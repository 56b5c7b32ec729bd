//! # Secret Broker
//!
//! The one object the rest of the process talks to for secrets. It owns the
//! store handle, the cache and the audit sink, and ties their lifecycle to
//! `initialize`/`close`.
//!
//! Read paths absorb store failures: `get_secret` answers `None` or the last
//! known value instead of an error, and [`SecretBroker::lookup`] says which of
//! those happened. Write paths (`set`, `delete`, `rotate`, `generate`) always
//! surface the store's error and only invalidate the cache once the store has
//! accepted the change.
//!
//! Every broker-level operation attempt emits exactly one [`AuditEvent`] per
//! key it touches.

use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

use super::audit::{AuditEvent, AuditOperation, AuditSink, AuditSource, TracingAuditSink, ALL_KEYS};
use super::backends::{select_store, BackendConfig};
use super::cache::{CacheStats, SecretCache, SecretLookup, DEFAULT_TTL};
use super::error::{Result, SecretsError};
use super::generator::{SecretGenerator, SecretKind};
use super::keys::{validate_key, CRITICAL_KEYS};
use super::store::{HealthStatus, ProviderKind, SecretStore};
use super::types::{SecretMetadata, SecretString, SecretValue};
use super::validator::SecretValidator;
use crate::observability::MetricsRecorder;
use crate::secret_span;

/// Characters shown by [`SecretBroker::preview`].
pub const PREVIEW_LEN: usize = 8;

/// Construction-time knobs for a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerOptions {
    pub cache_ttl: Duration,
    /// Run the validator inside `set_secret`/`set_secrets` and reject
    /// failing values before they reach the store.
    pub enforce_validation: bool,
    /// Recorded on every audit event.
    pub actor: Option<String>,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self { cache_ttl: DEFAULT_TTL, enforce_validation: false, actor: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerState {
    Created,
    Ready,
    Closed,
}

impl BrokerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Ready,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Ready => 1,
            Self::Closed => 2,
        }
    }
}

/// What a warmup pass found for each critical key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmupReport {
    pub loaded: Vec<String>,
    pub missing: Vec<String>,
    pub failed: Vec<String>,
}

impl WarmupReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.failed.is_empty()
    }
}

pub struct SecretBroker {
    store: Arc<dyn SecretStore>,
    cache: SecretCache,
    audit: Arc<dyn AuditSink>,
    metrics: MetricsRecorder,
    validator: SecretValidator,
    generator: SecretGenerator,
    options: BrokerOptions,
    state: AtomicU8,
    lifecycle: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SecretBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBroker")
            .field("provider", &self.store.provider())
            .field("state", &self.state())
            .field("cache_entries", &self.cache.len())
            .field("options", &self.options)
            .finish()
    }
}

impl SecretBroker {
    /// Wrap an already constructed store. Audit events go to the tracing sink.
    pub fn new(store: Arc<dyn SecretStore>, options: BrokerOptions) -> Self {
        Self {
            store,
            cache: SecretCache::new(options.cache_ttl),
            audit: Arc::new(TracingAuditSink),
            metrics: MetricsRecorder::new(),
            validator: SecretValidator::new(),
            generator: SecretGenerator::new(),
            options,
            state: AtomicU8::new(BrokerState::Created.as_u8()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Resolve the store from configuration. This is the only place a store
    /// is selected; the choice is fixed for the broker's lifetime.
    pub async fn from_backend(config: &BackendConfig, options: BrokerOptions) -> Result<Self> {
        let store = select_store(config).await?;
        Ok(Self::new(store, options))
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn provider(&self) -> ProviderKind {
        self.store.provider()
    }

    pub fn state(&self) -> BrokerState {
        BrokerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == BrokerState::Ready
    }

    pub fn options(&self) -> &BrokerOptions {
        &self.options
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Connect the store and warm the critical keys.
    ///
    /// A connect failure is fatal. Warmup failures are logged and reported
    /// but never fail initialization. Calling this on a ready broker is a
    /// no-op that returns an empty report.
    pub async fn initialize(&self) -> Result<WarmupReport> {
        let _guard = self.lifecycle.lock().await;
        match self.state() {
            BrokerState::Ready => {
                debug!("Secret broker already initialized");
                return Ok(WarmupReport::default());
            }
            BrokerState::Closed => return Err(closed_error()),
            BrokerState::Created => {}
        }

        let provider = self.provider();
        info!(provider = %provider, "Initializing secret broker");

        let started = Instant::now();
        let connected = self.store.connect().await;
        self.metrics.record_store_call("connect", connected.is_ok(), started.elapsed().as_secs_f64());
        if let Err(e) = connected {
            warn!(provider = %provider, error = %e, "Secret store connection failed");
            return Err(e);
        }

        let report = self.warm_critical_keys().await;
        self.state.store(BrokerState::Ready.as_u8(), Ordering::Release);

        info!(
            provider = %provider,
            loaded = report.loaded.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            "Secret broker initialized"
        );
        Ok(report)
    }

    /// Drop cached values and release the store. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if self.state() == BrokerState::Closed {
            return Ok(());
        }
        self.state.store(BrokerState::Closed.as_u8(), Ordering::Release);

        let dropped = self.cache.clear();
        self.metrics.update_cache_entries(0);
        info!(provider = %self.provider(), dropped_entries = dropped, "Closing secret broker");
        self.store.close().await
    }

    /// Read `key` through the cache and say how the answer was obtained.
    ///
    /// Errors only on misuse: an invalid key or a closed broker.
    pub async fn lookup(&self, key: &str) -> Result<SecretLookup> {
        self.guard(AuditOperation::Get, key)?;

        let span = secret_span!(AuditOperation::Get, key);
        let lookup = self.read_through(key).instrument(span).await;
        self.emit(
            AuditEvent::new(AuditOperation::Get, key, lookup.source())
                .with_success(lookup.is_success())
                .with_error(lookup.error().map(str::to_string)),
        );
        Ok(lookup)
    }

    /// The secret's value, or `None` when it is absent or the store is
    /// unavailable with nothing cached.
    pub async fn get_secret(&self, key: &str) -> Result<Option<SecretValue>> {
        Ok(self.lookup(key).await?.into_value())
    }

    /// Like [`get_secret`](Self::get_secret), coercing a scalar into `{"value": scalar}`.
    pub async fn get_secret_object(&self, key: &str) -> Result<Option<Map<String, Value>>> {
        Ok(self.get_secret(key).await?.map(SecretValue::into_fields))
    }

    /// The secret as a single string: the text itself or the map's `value` field.
    pub async fn get_secret_text(&self, key: &str) -> Result<Option<SecretString>> {
        Ok(self
            .get_secret(key)
            .await?
            .and_then(|value| value.primary_text())
            .map(SecretString::new))
    }

    /// Read several keys concurrently. A key that fails, including one with
    /// an invalid name, maps to `None` without affecting the others.
    pub async fn get_secrets(&self, keys: &[&str]) -> Result<HashMap<String, Option<SecretValue>>> {
        self.ensure_open()?;

        let results = join_all(keys.iter().map(|key| async move {
            let value = match self.get_secret(key).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping secret in batch read");
                    None
                }
            };
            (key.to_string(), value)
        }))
        .await;

        Ok(results.into_iter().collect())
    }

    pub async fn secret_exists(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }

    pub async fn secrets_exist(&self, keys: &[&str]) -> Result<HashMap<String, bool>> {
        Ok(self
            .get_secrets(keys)
            .await?
            .into_iter()
            .map(|(key, value)| (key, value.is_some()))
            .collect())
    }

    /// First [`PREVIEW_LEN`] characters of the secret, for existence checks
    /// shown to operators. Never more.
    pub async fn preview(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .get_secret_text(key)
            .await?
            .map(|secret| secret.preview(PREVIEW_LEN)))
    }

    /// Write `value` under `key`, then invalidate the cached copy.
    pub async fn set_secret(
        &self,
        key: &str,
        value: &SecretValue,
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        self.guard(AuditOperation::Set, key)?;
        if let Err(e) = self.enforce_policy(key, value) {
            self.emit(AuditEvent::new(AuditOperation::Set, key, AuditSource::Backend).failed(e.to_string()));
            return Err(e);
        }

        self.mutate(AuditOperation::Set, key, self.store.set(key, value, metadata)).await
    }

    pub async fn delete_secret(&self, key: &str) -> Result<()> {
        self.guard(AuditOperation::Delete, key)?;
        self.mutate(AuditOperation::Delete, key, self.store.delete(key)).await
    }

    /// Have the store replace the value with fresh material. The next read
    /// fetches the rotated value.
    pub async fn rotate_secret(&self, key: &str) -> Result<()> {
        self.guard(AuditOperation::Rotate, key)?;
        self.mutate(AuditOperation::Rotate, key, self.store.rotate(key)).await
    }

    /// Write several secrets in one store call.
    ///
    /// Atomicity is whatever the store provides. Since a failed batch may
    /// have been partially applied, every key in it is invalidated either way.
    pub async fn set_secrets(
        &self,
        entries: &[(String, SecretValue)],
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        for (key, value) in entries {
            self.guard(AuditOperation::Set, key)?;
            if let Err(e) = self.enforce_policy(key, value) {
                self.emit(
                    AuditEvent::new(AuditOperation::Set, key.as_str(), AuditSource::Backend)
                        .failed(e.to_string()),
                );
                return Err(e);
            }
        }
        if entries.is_empty() {
            return Ok(());
        }

        let span = secret_span!(AuditOperation::Set, ALL_KEYS, entries = entries.len());
        let started = Instant::now();
        let result = self.store.set_many(entries, metadata).instrument(span).await;
        self.metrics.record_store_call("set_many", result.is_ok(), started.elapsed().as_secs_f64());

        let error = result.as_ref().err().map(|e| e.to_string());
        for (key, _) in entries {
            self.cache.invalidate(key);
            self.emit(
                AuditEvent::new(AuditOperation::Set, key.as_str(), AuditSource::Backend)
                    .with_success(error.is_none())
                    .with_error(error.clone()),
            );
        }
        self.metrics.update_cache_entries(self.cache.len());

        match result {
            Ok(()) => {
                info!(entries = entries.len(), "Stored secret batch");
                Ok(())
            }
            Err(e) => {
                warn!(entries = entries.len(), error = %e, "Secret batch write failed");
                Err(e)
            }
        }
    }

    /// Generate material of `kind` and store it under `key`.
    ///
    /// Generated values bypass the validator.
    pub async fn generate_secret(
        &self,
        key: &str,
        kind: SecretKind,
        metadata: Option<&SecretMetadata>,
    ) -> Result<SecretString> {
        self.guard(AuditOperation::Set, key)?;
        let secret = self.generator.generate(key, kind);
        let value = SecretValue::from(&secret);
        self.mutate(AuditOperation::Set, key, self.store.set(key, &value, metadata)).await?;
        Ok(secret)
    }

    /// Drop every cached entry. Returns how many were dropped.
    pub fn clear_cache(&self) -> usize {
        let dropped = self.cache.clear();
        self.metrics.update_cache_entries(0);
        self.emit(AuditEvent::new(AuditOperation::Clear, ALL_KEYS, AuditSource::Cache));
        info!(dropped_entries = dropped, "Secret cache cleared");
        dropped
    }

    /// Clear the cache, then warm the critical keys again.
    pub async fn refresh_secrets(&self) -> Result<WarmupReport> {
        self.ensure_open()?;
        self.clear_cache();
        Ok(self.warm_critical_keys().await)
    }

    /// Store health. A failing probe becomes an unhealthy status, never an error.
    pub async fn health(&self) -> HealthStatus {
        let started = Instant::now();
        let result = self.store.health().await;
        self.metrics.record_store_call("health", result.is_ok(), started.elapsed().as_secs_f64());

        match result {
            Ok(status) => status,
            Err(e) => {
                warn!(provider = %self.provider(), error = %e, "Secret store health check failed");
                HealthStatus::unhealthy(self.provider(), e.to_string())
            }
        }
    }

    async fn warm_critical_keys(&self) -> WarmupReport {
        let hint = self.store.warmup(&CRITICAL_KEYS).await;
        if let Err(e) = hint {
            warn!(provider = %self.provider(), error = %e, "Secret store warmup hint failed");
        }

        let lookups = join_all(CRITICAL_KEYS.iter().map(|key| async move {
            let span = secret_span!(AuditOperation::Warmup, key);
            (*key, self.read_through(key).instrument(span).await)
        }))
        .await;

        let mut report = WarmupReport::default();
        for (key, lookup) in lookups {
            match &lookup {
                SecretLookup::Unavailable { error } | SecretLookup::Stale { error, .. } => {
                    warn!(key = %key, error = %error, "Failed to warm critical secret");
                    report.failed.push(key.to_string());
                }
                SecretLookup::Absent { .. } => {
                    warn!(key = %key, "Critical secret is not present in the store");
                    report.missing.push(key.to_string());
                }
                SecretLookup::Cached(_) | SecretLookup::Fresh(_) => report.loaded.push(key.to_string()),
            }
            self.emit(
                AuditEvent::new(AuditOperation::Warmup, key, lookup.source())
                    .with_success(lookup.is_success())
                    .with_error(lookup.error().map(str::to_string)),
            );
        }
        report
    }

    async fn read_through(&self, key: &str) -> SecretLookup {
        let started = Instant::now();
        let lookup = self.cache.read_through(key, self.store.as_ref()).await;
        let reached_store =
            !matches!(lookup, SecretLookup::Cached(_) | SecretLookup::Absent { from_cache: true });
        if reached_store {
            self.metrics.record_store_call("get", lookup.is_success(), started.elapsed().as_secs_f64());
            self.metrics.update_cache_entries(self.cache.len());
        }
        self.metrics.record_lookup(lookup.outcome());
        lookup
    }

    async fn mutate(
        &self,
        operation: AuditOperation,
        key: &str,
        call: impl Future<Output = Result<()>>,
    ) -> Result<()> {
        let span = secret_span!(operation, key);
        let started = Instant::now();
        let result = call.instrument(span).await;
        self.metrics.record_store_call(operation.as_str(), result.is_ok(), started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                self.cache.invalidate(key);
                self.metrics.update_cache_entries(self.cache.len());
                self.emit(AuditEvent::new(operation, key, AuditSource::Backend));
                info!(key = %key, operation = %operation, "Secret mutation applied");
                Ok(())
            }
            Err(e) => {
                warn!(key = %key, operation = %operation, error = %e, "Secret mutation failed");
                self.emit(AuditEvent::new(operation, key, AuditSource::Backend).failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Misuse checks shared by every keyed operation. Failures are audited.
    fn guard(&self, operation: AuditOperation, key: &str) -> Result<()> {
        let checked = self.ensure_open().and_then(|()| validate_key(key));
        if let Err(e) = &checked {
            self.emit(AuditEvent::new(operation, key, AuditSource::Cache).failed(e.to_string()));
        }
        checked
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state() == BrokerState::Closed {
            return Err(closed_error());
        }
        Ok(())
    }

    fn enforce_policy(&self, key: &str, value: &SecretValue) -> Result<()> {
        if !self.options.enforce_validation {
            return Ok(());
        }
        match value.primary_text() {
            Some(text) => self
                .validator
                .check(key, &text)
                .map_err(|rejection| SecretsError::invalid_value(format!("{key}: {rejection}"))),
            None => Ok(()),
        }
    }

    fn emit(&self, event: AuditEvent) {
        let event = event.with_actor(self.options.actor.clone());
        self.metrics.record_audit_event(event.operation.as_str(), event.success);
        self.audit.record(event);
    }
}

fn closed_error() -> SecretsError {
    SecretsError::internal("secret broker is closed")
}
