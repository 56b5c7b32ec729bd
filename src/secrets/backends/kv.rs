//! Distributed KV store backed by HashiCorp Vault's KV v2 engine.
//!
//! Every secret is one KV path under the configured mount. Scalar secrets
//! are stored as `{"value": "..."}`; field maps are stored as-is.
//!
//! Metadata is flattened with [`SecretMetadata::to_tags`] into KV v2 custom
//! metadata, written before the value so a rejected metadata write leaves
//! the secret untouched.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use vaultrs::api::kv2::requests::SetSecretMetadataRequest;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use crate::secrets::error::{Result, SecretsError};
use crate::secrets::generator::SecretGenerator;
use crate::secrets::store::{HealthStatus, ProviderKind, SecretStore};
use crate::secrets::types::{SecretMetadata, SecretString, SecretValue};

pub const DEFAULT_KV_MOUNT: &str = "secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvStoreConfig {
    /// Server address, e.g. `https://vault.internal:8200`.
    pub endpoint: String,
    pub token: SecretString,
    pub mount: String,
    /// Enterprise namespace.
    pub namespace: Option<String>,
}

impl KvStoreConfig {
    pub fn new(endpoint: impl Into<String>, token: impl Into<SecretString>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            mount: DEFAULT_KV_MOUNT.to_string(),
            namespace: None,
        }
    }
}

pub struct VaultKvStore {
    client: VaultClient,
    endpoint: String,
    mount: String,
}

impl VaultKvStore {
    /// Build the client. No request is made until [`SecretStore::connect`].
    pub fn new(config: &KvStoreConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(SecretsError::config_error("kv-store endpoint cannot be empty"));
        }
        if config.token.is_empty() {
            return Err(SecretsError::config_error("kv-store token cannot be empty"));
        }

        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.endpoint);
        settings_builder.token(config.token.expose_secret());
        if let Some(namespace) = &config.namespace {
            settings_builder.namespace(Some(namespace.clone()));
        }

        let settings = settings_builder
            .build()
            .map_err(|e| SecretsError::config_error(format!("Invalid kv-store configuration: {e}")))?;
        let client = VaultClient::new(settings).map_err(|e| {
            SecretsError::connection_failed(format!("Failed to create kv-store client: {e}"))
        })?;

        Ok(Self { client, endpoint: config.endpoint.clone(), mount: config.mount.clone() })
    }

    async fn write(&self, key: &str, value: &SecretValue) -> Result<()> {
        let data = value.clone().into_fields();
        kv2::set(&self.client, &self.mount, key, &data)
            .await
            .map_err(|e| map_client_error(key, "write", e))?;
        Ok(())
    }

    async fn write_metadata(&self, key: &str, metadata: &SecretMetadata) -> Result<()> {
        let custom: HashMap<String, String> = metadata.to_tags().into_iter().collect();
        if custom.is_empty() {
            return Ok(());
        }
        let mut request = SetSecretMetadataRequest::builder();
        request.custom_metadata(custom);
        kv2::set_metadata(&self.client, &self.mount, key, Some(&mut request))
            .await
            .map_err(|e| map_client_error(key, "write metadata", e))
    }
}

impl fmt::Debug for VaultKvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultKvStore")
            .field("endpoint", &self.endpoint)
            .field("mount", &self.mount)
            .finish()
    }
}

/// A payload that is exactly `{"value": "<string>"}` is a scalar secret.
fn from_kv_data(data: Map<String, Value>) -> SecretValue {
    if data.len() == 1 {
        if let Some(Value::String(s)) = data.get("value") {
            return SecretValue::Text(s.clone());
        }
    }
    SecretValue::Fields(data)
}

fn map_client_error(key: &str, action: &str, err: ClientError) -> SecretsError {
    match err {
        ClientError::APIError { code: 404, .. } => SecretsError::not_found(key),
        ClientError::APIError { code: 401 | 403, errors } => SecretsError::authentication_failed(
            format!("kv-store denied {action} on '{key}': {}", errors.join("; ")),
        ),
        ClientError::RestClientError { source } => {
            SecretsError::connection_failed(format!("kv-store unreachable: {source}"))
        }
        other => SecretsError::backend_error(format!("kv-store {action} failed for '{key}': {other}")),
    }
}

#[async_trait]
impl SecretStore for VaultKvStore {
    fn provider(&self) -> ProviderKind {
        ProviderKind::KvStore
    }

    async fn connect(&self) -> Result<()> {
        match vaultrs::sys::health(&self.client).await {
            Ok(_) => {
                tracing::info!(endpoint = %self.endpoint, "Connected to kv-store");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, endpoint = %self.endpoint, "Failed to connect to kv-store");
                Err(SecretsError::connection_failed(format!("kv-store health check failed: {e}")))
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<SecretValue>> {
        match kv2::read::<Map<String, Value>>(&self.client, &self.mount, key).await {
            Ok(data) => Ok(Some(from_kv_data(data))),
            Err(e) => match map_client_error(key, "read", e) {
                SecretsError::NotFound { .. } => Ok(None),
                err => {
                    tracing::error!(error = %err, key = %key, "Failed to read secret from kv-store");
                    Err(err)
                }
            },
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &SecretValue,
        metadata: Option<&SecretMetadata>,
    ) -> Result<()> {
        if let Some(metadata) = metadata {
            self.write_metadata(key, metadata).await?;
        }
        self.write(key, value).await?;
        tracing::info!(key = %key, mount = %self.mount, "Stored secret in kv-store");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        kv2::delete_metadata(&self.client, &self.mount, key)
            .await
            .map_err(|e| map_client_error(key, "delete", e))?;
        tracing::info!(key = %key, mount = %self.mount, "Deleted secret from kv-store");
        Ok(())
    }

    async fn rotate(&self, key: &str) -> Result<()> {
        let current = self.get(key).await?.ok_or_else(|| SecretsError::not_found(key))?;
        let rotated = SecretGenerator::new().rotated_value(key, Some(&current));
        self.write(key, &rotated)
            .await
            .map_err(|e| SecretsError::rotation_failed(key, e.to_string()))?;
        tracing::info!(key = %key, "Rotated secret in kv-store");
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus> {
        let health = vaultrs::sys::health(&self.client)
            .await
            .map_err(|e| SecretsError::connection_failed(format!("kv-store health check failed: {e}")))?;
        if health.sealed {
            return Ok(HealthStatus::unhealthy(ProviderKind::KvStore, "kv-store is sealed"));
        }
        Ok(HealthStatus::healthy(ProviderKind::KvStore).with_detail(format!("mount {}", self.mount)))
    }
}
