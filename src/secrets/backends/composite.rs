//! Primary store with ordered read fallbacks.
//!
//! Reads try the primary first and walk the fallbacks when the primary has
//! no value or fails. Writes, rotation and deletion only ever touch the
//! primary, so fallbacks stay read-only sources (typically the environment).

use async_trait::async_trait;
use std::sync::Arc;

use crate::secrets::error::{Result, SecretsError};
use crate::secrets::store::{HealthStatus, ProviderKind, SecretStore};
use crate::secrets::types::{SecretMetadata, SecretValue};

#[derive(Debug, Clone)]
pub struct CompositeSecretStore {
    primary: Arc<dyn SecretStore>,
    fallbacks: Vec<Arc<dyn SecretStore>>,
}

impl CompositeSecretStore {
    pub fn new(primary: Arc<dyn SecretStore>, fallbacks: Vec<Arc<dyn SecretStore>>) -> Self {
        Self { primary, fallbacks }
    }

    pub fn primary_provider(&self) -> ProviderKind {
        self.primary.provider()
    }

    pub fn fallback_providers(&self) -> Vec<ProviderKind> {
        self.fallbacks.iter().map(|store| store.provider()).collect()
    }
}

#[async_trait]
impl SecretStore for CompositeSecretStore {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Composite
    }

    async fn connect(&self) -> Result<()> {
        self.primary.connect().await?;
        for fallback in &self.fallbacks {
            if let Err(e) = fallback.connect().await {
                tracing::warn!(
                    provider = %fallback.provider(),
                    error = %e,
                    "Fallback secret store failed to connect, reads will skip it"
                );
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SecretValue>> {
        let primary_error = match self.primary.get(key).await {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    provider = %self.primary.provider(),
                    error = %e,
                    "Primary secret store failed, attempting fallbacks"
                );
                Some(e)
            }
        };

        for fallback in &self.fallbacks {
            match fallback.get(key).await {
                Ok(Some(value)) => {
                    tracing::debug!(key = %key, provider = %fallback.provider(), "Secret served by fallback store");
                    return Ok(Some(value));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = %key, provider = %fallback.provider(), error = %e, "Fallback secret store failed");
                }
            }
        }

        match primary_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &SecretValue,
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        self.primary.set(key, value, metadata).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.primary.delete(key).await
    }

    async fn rotate(&self, key: &str) -> Result<()> {
        self.primary.rotate(key).await
    }

    async fn health(&self) -> Result<HealthStatus> {
        let primary = self.primary.health().await?;
        let fallbacks: Vec<&str> = self.fallbacks.iter().map(|s| s.provider().as_str()).collect();
        let detail = format!(
            "primary {} ({}), fallbacks [{}]",
            primary.provider,
            if primary.healthy { "healthy" } else { "unhealthy" },
            fallbacks.join(", ")
        );
        Ok(HealthStatus { provider: ProviderKind::Composite, detail: Some(detail), ..primary })
    }

    async fn warmup(&self, keys: &[&str]) -> Result<()> {
        self.primary.warmup(keys).await
    }

    async fn set_many(
        &self,
        entries: &[(String, SecretValue)],
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        self.primary.set_many(entries, metadata).await
    }

    async fn close(&self) -> Result<()> {
        let mut first_error: Option<SecretsError> = None;
        for store in std::iter::once(&self.primary).chain(self.fallbacks.iter()) {
            if let Err(e) = store.close().await {
                tracing::warn!(provider = %store.provider(), error = %e, "Failed to close secret store");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
