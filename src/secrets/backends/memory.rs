//! In-process secret store.
//!
//! Not persistent: data is lost when the process exits. Useful for local
//! development and as the scripted store in tests, where it can be told to
//! fail for specific keys or to go offline entirely.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::secrets::error::{Result, SecretsError};
use crate::secrets::generator::SecretGenerator;
use crate::secrets::store::{HealthStatus, ProviderKind, SecretStore};
use crate::secrets::types::{SecretMetadata, SecretValue};

#[derive(Clone)]
struct StoredSecret {
    value: SecretValue,
    metadata: Option<SecretMetadata>,
}

#[derive(Default)]
pub struct MemorySecretStore {
    data: DashMap<String, StoredSecret>,
    failing: DashSet<String>,
    offline: AtomicBool,
    get_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value at construction time.
    pub fn with_secret(self, key: &str, value: impl Into<SecretValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Write directly, bypassing failure injection and call counters.
    /// Simulates a change made by another process.
    pub fn insert(&self, key: &str, value: impl Into<SecretValue>) {
        self.data.insert(key.to_string(), StoredSecret { value: value.into(), metadata: None });
    }

    /// Read directly, bypassing failure injection and call counters.
    pub fn peek(&self, key: &str) -> Option<SecretValue> {
        self.data.get(key).map(|stored| stored.value.clone())
    }

    pub fn metadata(&self, key: &str) -> Option<SecretMetadata> {
        self.data.get(key).and_then(|stored| stored.metadata.clone())
    }

    /// Make every operation on `key` fail with a backend error.
    pub fn fail_key(&self, key: &str) {
        self.failing.insert(key.to_string());
    }

    pub fn heal_key(&self, key: &str) {
        self.failing.remove(key);
    }

    /// Make every operation fail with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `get` calls that reached the store.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of `set`/`delete`/`rotate` calls that reached the store.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SecretsError::connection_failed("memory store is offline"));
        }
        if self.failing.contains(key) {
            return Err(SecretsError::backend_error(format!("injected failure for '{key}'")));
        }
        Ok(())
    }
}

impl fmt::Debug for MemorySecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySecretStore")
            .field("keys_count", &self.data.len())
            .field("offline", &self.offline.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Memory
    }

    async fn connect(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SecretsError::connection_failed("memory store is offline"));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SecretValue>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check(key)?;
        Ok(self.data.get(key).map(|stored| stored.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: &SecretValue,
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.check(key)?;
        self.data.insert(
            key.to_string(),
            StoredSecret { value: value.clone(), metadata: metadata.cloned() },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.check(key)?;
        self.data.remove(key).map(|_| ()).ok_or_else(|| SecretsError::not_found(key))
    }

    async fn rotate(&self, key: &str) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.check(key)?;
        let mut stored = self.data.get_mut(key).ok_or_else(|| SecretsError::not_found(key))?;
        let rotated = SecretGenerator::new().rotated_value(key, Some(&stored.value));
        stored.value = rotated;
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SecretsError::connection_failed("memory store is offline"));
        }
        Ok(HealthStatus::healthy(ProviderKind::Memory)
            .with_detail(format!("{} secrets held in memory", self.data.len())))
    }

    async fn warmup(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.check(key)?;
        }
        Ok(())
    }
}
