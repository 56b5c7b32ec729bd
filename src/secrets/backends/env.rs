//! Environment variable store, for development only.
//!
//! Secrets are read from variables named `SECRET_BROKER_SECRET_<KEY>`, where
//! the key is upper-cased and `-`, `.` and `/` become `_`:
//!
//! ```bash
//! export SECRET_BROKER_SECRET_JWT_SECRET="..."
//! export SECRET_BROKER_SECRET_CACHE_STORE='{"host":"localhost","port":6379}'
//! ```
//!
//! JSON object payloads are returned as field maps. The store is read-only:
//! every mutation returns [`SecretsError::Unsupported`].

use async_trait::async_trait;
use std::env;

use crate::secrets::error::{Result, SecretsError};
use crate::secrets::store::{HealthStatus, ProviderKind, SecretStore};
use crate::secrets::types::{SecretMetadata, SecretValue};

pub const DEFAULT_ENV_PREFIX: &str = "SECRET_BROKER_SECRET_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvStoreConfig {
    pub prefix: String,
}

impl Default for EnvStoreConfig {
    fn default() -> Self {
        Self { prefix: DEFAULT_ENV_PREFIX.to_string() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore {
    prefix: String,
}

impl EnvSecretStore {
    pub fn new(config: &EnvStoreConfig) -> Self {
        Self { prefix: config.prefix.clone() }
    }

    pub fn env_var_name(&self, key: &str) -> String {
        let suffix: String = key
            .chars()
            .map(|c| match c {
                '-' | '.' | '/' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }

    fn read_only(&self, operation: &str) -> SecretsError {
        SecretsError::unsupported(operation, ProviderKind::Env.as_str())
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Env
    }

    async fn get(&self, key: &str) -> Result<Option<SecretValue>> {
        match env::var(self.env_var_name(key)) {
            Ok(raw) => Ok(Some(SecretValue::from_payload(&raw))),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(SecretsError::invalid_value(format!(
                "environment variable for '{key}' is not valid UTF-8"
            ))),
        }
    }

    async fn set(&self, _key: &str, _value: &SecretValue, _: Option<&SecretMetadata>) -> Result<()> {
        Err(self.read_only("set"))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(self.read_only("delete"))
    }

    async fn rotate(&self, _key: &str) -> Result<()> {
        Err(self.read_only("rotate"))
    }

    async fn health(&self) -> Result<HealthStatus> {
        let count = env::vars_os()
            .filter(|(name, _)| name.to_str().is_some_and(|n| n.starts_with(&self.prefix)))
            .count();
        Ok(HealthStatus::healthy(ProviderKind::Env)
            .with_detail(format!("{count} secrets visible under {}", self.prefix)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that touch them.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn store() -> EnvSecretStore {
        EnvSecretStore::new(&EnvStoreConfig { prefix: "SB_ENV_TEST_".into() })
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(store().env_var_name("api-key-stripe"), "SB_ENV_TEST_API_KEY_STRIPE");
        assert_eq!(store().env_var_name("team/db.url"), "SB_ENV_TEST_TEAM_DB_URL");
    }

    #[tokio::test]
    async fn test_get_reads_environment() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("SB_ENV_TEST_JWT_SECRET", "from-env");
        env::set_var("SB_ENV_TEST_CACHE_STORE", r#"{"host":"localhost","port":6379}"#);

        let store = store();
        assert_eq!(store.get("jwt-secret").await.unwrap(), Some(SecretValue::text("from-env")));
        let cache = store.get("cache-store").await.unwrap().unwrap();
        assert_eq!(cache.field_str("port").as_deref(), Some("6379"));
        assert_eq!(store.get("missing-key").await.unwrap(), None);

        env::remove_var("SB_ENV_TEST_JWT_SECRET");
        env::remove_var("SB_ENV_TEST_CACHE_STORE");
    }

    #[tokio::test]
    async fn test_mutations_are_unsupported() {
        let store = store();
        let err = store.set("k", &SecretValue::text("v"), None).await.unwrap_err();
        assert!(matches!(err, SecretsError::Unsupported { .. }));
        assert!(store.delete("k").await.is_err());
        assert!(store.rotate("k").await.is_err());
        assert!(store.health().await.unwrap().healthy);
    }
}
