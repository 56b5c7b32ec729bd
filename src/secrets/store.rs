//! The capability contract every credential store satisfies.
//!
//! The broker only ever talks to a store through [`SecretStore`]. How a
//! store authenticates, persists, retries or times out is the store's own
//! business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{Result, SecretsError};
use super::types::{SecretMetadata, SecretValue};

/// Which kind of store sits behind the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Cluster-native secret store (Kubernetes Secrets).
    #[default]
    Cluster,
    /// Distributed KV store (Vault KV v2).
    KvStore,
    /// Cloud KMS-backed store (AWS Secrets Manager with a KMS key).
    CloudKms,
    /// Primary store with read fallbacks.
    Composite,
    /// Read-only environment variables, for development.
    Env,
    /// In-process map, for development and tests.
    Memory,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::KvStore => "kv-store",
            Self::CloudKms => "cloud-kms",
            Self::Composite => "composite",
            Self::Env => "env",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = SecretsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cluster" | "kubernetes" | "k8s" => Ok(Self::Cluster),
            "kv-store" | "kv" | "vault" => Ok(Self::KvStore),
            "cloud-kms" | "aws" => Ok(Self::CloudKms),
            "composite" => Ok(Self::Composite),
            "env" => Ok(Self::Env),
            "memory" => Ok(Self::Memory),
            other => Err(SecretsError::config_error(format!("Unknown secrets provider: {other}"))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health report for a store. The broker returns one of these even when
/// the store's health probe itself fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub provider: ProviderKind,
    pub healthy: bool,
    pub detail: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    pub fn healthy(provider: ProviderKind) -> Self {
        Self { provider, healthy: true, detail: None, checked_at: Utc::now() }
    }

    pub fn unhealthy(provider: ProviderKind, detail: impl Into<String>) -> Self {
        Self { provider, healthy: false, detail: Some(detail.into()), checked_at: Utc::now() }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// External credential store.
///
/// Implementations MUST NOT log secret values. `get` returns `Ok(None)`
/// for a missing key; errors are reserved for the store being unable to
/// answer.
#[async_trait]
pub trait SecretStore: Send + Sync + fmt::Debug {
    fn provider(&self) -> ProviderKind;

    /// Establish connections or validate credentials. Called once by
    /// `SecretBroker::initialize`.
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SecretValue>>;

    async fn set(
        &self,
        key: &str,
        value: &SecretValue,
        metadata: Option<&SecretMetadata>,
    ) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Replace the stored value with freshly generated material, keeping the key.
    async fn rotate(&self, key: &str) -> Result<()>;

    async fn health(&self) -> Result<HealthStatus>;

    /// Best-effort prefetch hint. Stores without a server-side notion of
    /// prefetching ignore it.
    async fn warmup(&self, _keys: &[&str]) -> Result<()> {
        Ok(())
    }

    /// Batched write. The default writes sequentially and stops at the first
    /// failure; stores with transactional writes override it.
    async fn set_many(
        &self,
        entries: &[(String, SecretValue)],
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value, metadata).await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
