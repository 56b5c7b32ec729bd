//! Shared fixtures for integration tests.
//!
//! [`ScriptedStore`] is an in-process store that counts calls per key and can
//! be told to fail reads, writes or health checks, or to answer slowly.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secret_broker::secrets::{
    BrokerOptions, HealthStatus, MemoryAuditSink, ProviderKind, SecretBroker, SecretMetadata,
    SecretStore, SecretValue, SecretsError,
};

#[derive(Debug, Default)]
pub struct ScriptedStore {
    data: Mutex<HashMap<String, SecretValue>>,
    failing_reads: Mutex<HashSet<String>>,
    fail_writes: AtomicBool,
    fail_warmup: AtomicBool,
    offline: AtomicBool,
    get_calls: Mutex<HashMap<String, usize>>,
    writes: AtomicUsize,
    rotations: AtomicUsize,
    read_delay: Mutex<Option<Duration>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: impl Into<SecretValue>) -> Self {
        self.put(key, value);
        self
    }

    /// Change the stored value behind the broker's back.
    pub fn put(&self, key: &str, value: impl Into<SecretValue>) {
        self.data.lock().unwrap().insert(key.to_string(), value.into());
    }

    pub fn value(&self, key: &str) -> Option<SecretValue> {
        self.data.lock().unwrap().get(key).cloned()
    }

    pub fn fail_reads(&self, key: &str) {
        self.failing_reads.lock().unwrap().insert(key.to_string());
    }

    pub fn heal_reads(&self, key: &str) {
        self.failing_reads.lock().unwrap().remove(key);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_warmup(&self, fail: bool) {
        self.fail_warmup.store(fail, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn gets(&self, key: &str) -> usize {
        self.get_calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_gets(&self) -> usize {
        self.get_calls.lock().unwrap().values().sum()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_write(&self, key: &str) -> Result<(), SecretsError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) || self.offline.load(Ordering::SeqCst) {
            return Err(SecretsError::backend_error(format!("scripted write failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for ScriptedStore {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Memory
    }

    async fn get(&self, key: &str) -> Result<Option<SecretValue>, SecretsError> {
        *self.get_calls.lock().unwrap().entry(key.to_string()).or_default() += 1;

        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) || self.failing_reads.lock().unwrap().contains(key) {
            return Err(SecretsError::connection_failed(format!("scripted read failure for {key}")));
        }
        Ok(self.value(key))
    }

    async fn set(
        &self,
        key: &str,
        value: &SecretValue,
        _metadata: Option<&SecretMetadata>,
    ) -> Result<(), SecretsError> {
        self.check_write(key)?;
        self.put(key, value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SecretsError> {
        self.check_write(key)?;
        self.data
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| SecretsError::not_found(key))
    }

    async fn rotate(&self, key: &str) -> Result<(), SecretsError> {
        self.check_write(key)?;
        let n = self.rotations.fetch_add(1, Ordering::SeqCst) + 1;
        let mut data = self.data.lock().unwrap();
        let slot = data.get_mut(key).ok_or_else(|| SecretsError::not_found(key))?;
        *slot = SecretValue::text(format!("rotated-{n}"));
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus, SecretsError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SecretsError::connection_failed("scripted store offline"));
        }
        Ok(HealthStatus::healthy(ProviderKind::Memory))
    }

    async fn warmup(&self, _keys: &[&str]) -> Result<(), SecretsError> {
        if self.fail_warmup.load(Ordering::SeqCst) {
            return Err(SecretsError::backend_error("scripted warmup failure"));
        }
        Ok(())
    }
}

/// Broker over `store` with a recording audit sink.
pub fn broker(store: Arc<ScriptedStore>) -> (SecretBroker, Arc<MemoryAuditSink>) {
    broker_with_options(store, BrokerOptions::default())
}

pub fn broker_with_options(
    store: Arc<ScriptedStore>,
    options: BrokerOptions,
) -> (SecretBroker, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let broker = SecretBroker::new(store, options).with_audit_sink(audit.clone());
    (broker, audit)
}
