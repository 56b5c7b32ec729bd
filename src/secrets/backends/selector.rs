//! Backend selection: provider name plus parameters in, one store out.
//!
//! Selection happens exactly once, when the broker is built. The result is
//! a [`BackendConfig`] variant per provider; [`select_store`] turns it into
//! a live store.

use std::path::PathBuf;
use std::sync::Arc;

use super::cluster::{ClusterConfig, ClusterSecretStore, DEFAULT_NAMESPACE};
use super::composite::CompositeSecretStore;
use super::env::{EnvSecretStore, EnvStoreConfig, DEFAULT_ENV_PREFIX};
use super::kv::{KvStoreConfig, VaultKvStore, DEFAULT_KV_MOUNT};
use super::memory::MemorySecretStore;
use crate::secrets::error::{Result, SecretsError};
use crate::secrets::store::{ProviderKind, SecretStore};
use crate::secrets::types::SecretString;

#[cfg(feature = "aws")]
pub use super::cloud_kms::CloudKmsConfig;

/// Parameters for a cloud KMS-backed store. Mirrors the `aws` feature's
/// config type so selection works in builds without the SDK.
#[cfg(not(feature = "aws"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudKmsConfig {
    pub region: String,
    pub key_id: String,
    pub endpoint: Option<String>,
}

/// Flat provider parameters as they arrive from configuration. Only the
/// fields for the selected provider are consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderParams {
    pub namespace: String,
    pub cluster_api: Option<String>,
    pub cluster_token_path: Option<PathBuf>,
    pub cluster_ca_path: Option<PathBuf>,
    pub kv_endpoint: Option<String>,
    pub kv_token: Option<SecretString>,
    pub kv_mount: String,
    pub kv_namespace: Option<String>,
    pub cloud_region: Option<String>,
    pub cloud_key_id: Option<String>,
    pub cloud_endpoint: Option<String>,
    pub composite_primary: Option<ProviderKind>,
    pub composite_fallbacks: Vec<ProviderKind>,
    pub env_prefix: String,
}

impl Default for ProviderParams {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            cluster_api: None,
            cluster_token_path: None,
            cluster_ca_path: None,
            kv_endpoint: None,
            kv_token: None,
            kv_mount: DEFAULT_KV_MOUNT.to_string(),
            kv_namespace: None,
            cloud_region: None,
            cloud_key_id: None,
            cloud_endpoint: None,
            composite_primary: None,
            composite_fallbacks: vec![ProviderKind::Env],
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }
}

/// Resolved store configuration, one variant per provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Cluster(ClusterConfig),
    KvStore(KvStoreConfig),
    CloudKms(CloudKmsConfig),
    Composite { primary: Box<BackendConfig>, fallbacks: Vec<BackendConfig> },
    Env(EnvStoreConfig),
    Memory,
}

impl BackendConfig {
    /// Resolve a provider (default: cluster) against its parameters.
    pub fn resolve(provider: Option<ProviderKind>, params: &ProviderParams) -> Result<Self> {
        match provider.unwrap_or_default() {
            ProviderKind::Composite => {
                let primary = params.composite_primary.ok_or_else(|| {
                    SecretsError::config_error("composite provider requires a primary provider")
                })?;
                if primary == ProviderKind::Composite {
                    return Err(SecretsError::config_error("composite primary cannot itself be composite"));
                }
                let fallbacks = params
                    .composite_fallbacks
                    .iter()
                    .filter(|kind| **kind != primary)
                    .map(|kind| match kind {
                        ProviderKind::Composite => Err(SecretsError::config_error(
                            "composite fallbacks cannot be composite",
                        )),
                        kind => Self::resolve_leaf(*kind, params),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Composite {
                    primary: Box::new(Self::resolve_leaf(primary, params)?),
                    fallbacks,
                })
            }
            kind => Self::resolve_leaf(kind, params),
        }
    }

    fn resolve_leaf(kind: ProviderKind, params: &ProviderParams) -> Result<Self> {
        match kind {
            ProviderKind::Cluster => {
                let api_server = required(&params.cluster_api, "cluster", "API server URL")?;
                let mut config = ClusterConfig::new(params.namespace.clone(), api_server);
                config.token_path = params.cluster_token_path.clone();
                config.ca_cert_path = params.cluster_ca_path.clone();
                Ok(Self::Cluster(config))
            }
            ProviderKind::KvStore => {
                let endpoint = required(&params.kv_endpoint, "kv-store", "endpoint")?;
                let token = params
                    .kv_token
                    .clone()
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| SecretsError::config_error("kv-store provider requires a token"))?;
                let mut config = KvStoreConfig::new(endpoint, token);
                config.mount = params.kv_mount.clone();
                config.namespace = params.kv_namespace.clone();
                Ok(Self::KvStore(config))
            }
            ProviderKind::CloudKms => Ok(Self::CloudKms(CloudKmsConfig {
                region: required(&params.cloud_region, "cloud-kms", "region")?,
                key_id: required(&params.cloud_key_id, "cloud-kms", "key id")?,
                endpoint: params.cloud_endpoint.clone(),
            })),
            ProviderKind::Env => {
                Ok(Self::Env(EnvStoreConfig { prefix: params.env_prefix.clone() }))
            }
            ProviderKind::Memory => Ok(Self::Memory),
            ProviderKind::Composite => {
                Err(SecretsError::config_error("composite providers cannot be nested"))
            }
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::Cluster(_) => ProviderKind::Cluster,
            Self::KvStore(_) => ProviderKind::KvStore,
            Self::CloudKms(_) => ProviderKind::CloudKms,
            Self::Composite { .. } => ProviderKind::Composite,
            Self::Env(_) => ProviderKind::Env,
            Self::Memory => ProviderKind::Memory,
        }
    }
}

fn required(value: &Option<String>, provider: &str, what: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SecretsError::config_error(format!("{provider} provider requires a {what}")))
}

/// Build the store described by `config`.
pub async fn select_store(config: &BackendConfig) -> Result<Arc<dyn SecretStore>> {
    match config {
        BackendConfig::Composite { primary, fallbacks } => {
            let primary = build_leaf(primary).await?;
            let mut built = Vec::with_capacity(fallbacks.len());
            for fallback in fallbacks {
                built.push(build_leaf(fallback).await?);
            }
            tracing::info!(
                primary = %primary.provider(),
                fallbacks = built.len(),
                "Selected composite secret store"
            );
            Ok(Arc::new(CompositeSecretStore::new(primary, built)))
        }
        leaf => {
            let store = build_leaf(leaf).await?;
            tracing::info!(provider = %store.provider(), "Selected secret store");
            Ok(store)
        }
    }
}

async fn build_leaf(config: &BackendConfig) -> Result<Arc<dyn SecretStore>> {
    match config {
        BackendConfig::Cluster(cluster) => Ok(Arc::new(ClusterSecretStore::new(cluster)?)),
        BackendConfig::KvStore(kv) => Ok(Arc::new(VaultKvStore::new(kv)?)),
        #[cfg(feature = "aws")]
        BackendConfig::CloudKms(cloud) => {
            Ok(Arc::new(super::cloud_kms::CloudKmsStore::new(cloud).await?))
        }
        #[cfg(not(feature = "aws"))]
        BackendConfig::CloudKms(_) => Err(SecretsError::config_error(
            "cloud-kms provider requires building with the `aws` feature",
        )),
        BackendConfig::Env(env) => Ok(Arc::new(EnvSecretStore::new(env))),
        BackendConfig::Memory => Ok(Arc::new(MemorySecretStore::new())),
        BackendConfig::Composite { .. } => {
            Err(SecretsError::config_error("composite providers cannot be nested"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ProviderParams {
        ProviderParams {
            cluster_api: Some("https://kubernetes.default.svc".into()),
            kv_endpoint: Some("http://127.0.0.1:8200".into()),
            kv_token: Some("root".into()),
            ..ProviderParams::default()
        }
    }

    #[test]
    fn test_default_provider_is_cluster() {
        let config = BackendConfig::resolve(None, &params()).unwrap();
        assert_eq!(config.provider(), ProviderKind::Cluster);
        match config {
            BackendConfig::Cluster(cluster) => assert_eq!(cluster.namespace, "default"),
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn test_missing_parameters_are_config_errors() {
        let err = BackendConfig::resolve(Some(ProviderKind::KvStore), &ProviderParams::default())
            .unwrap_err();
        assert!(matches!(err, SecretsError::ConfigError { .. }));
        assert!(BackendConfig::resolve(Some(ProviderKind::CloudKms), &params()).is_err());
        assert!(BackendConfig::resolve(Some(ProviderKind::Cluster), &ProviderParams::default()).is_err());
    }

    #[test]
    fn test_composite_resolution() {
        let params = ProviderParams { composite_primary: Some(ProviderKind::KvStore), ..params() };
        let config = BackendConfig::resolve(Some(ProviderKind::Composite), &params).unwrap();
        match config {
            BackendConfig::Composite { primary, fallbacks } => {
                assert_eq!(primary.provider(), ProviderKind::KvStore);
                assert_eq!(fallbacks, vec![BackendConfig::Env(EnvStoreConfig::default())]);
            }
            other => panic!("unexpected config {other:?}"),
        }

        let nested = ProviderParams { composite_primary: Some(ProviderKind::Composite), ..params };
        assert!(BackendConfig::resolve(Some(ProviderKind::Composite), &nested).is_err());
        assert!(BackendConfig::resolve(Some(ProviderKind::Composite), &ProviderParams::default()).is_err());
    }

    #[tokio::test]
    async fn test_select_store_builds_expected_provider() {
        let store = select_store(&BackendConfig::Memory).await.unwrap();
        assert_eq!(store.provider(), ProviderKind::Memory);

        let composite = BackendConfig::Composite {
            primary: Box::new(BackendConfig::Memory),
            fallbacks: vec![BackendConfig::Env(EnvStoreConfig::default())],
        };
        let store = select_store(&composite).await.unwrap();
        assert_eq!(store.provider(), ProviderKind::Composite);
    }

    #[cfg(not(feature = "aws"))]
    #[tokio::test]
    async fn test_cloud_kms_requires_feature() {
        let config = BackendConfig::CloudKms(CloudKmsConfig {
            region: "eu-west-1".into(),
            key_id: "alias/app".into(),
            endpoint: None,
        });
        assert!(select_store(&config).await.is_err());
    }
}
