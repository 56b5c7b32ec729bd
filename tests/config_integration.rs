//! Integration tests for configuration management
//!
//! These tests validate that configuration is read from the process
//! environment and resolves to the expected secret store.

use secret_broker::secrets::{BackendConfig, ProviderKind, SecretBroker};
use secret_broker::{AppConfig, Result};
use std::env;
use std::sync::Mutex;

// Use a mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const VARS: &[&str] = &[
    "SECRET_BROKER_PROVIDER",
    "SECRET_BROKER_COMPOSITE_PRIMARY",
    "SECRET_BROKER_COMPOSITE_FALLBACKS",
    "SECRET_BROKER_CACHE_TTL_SECONDS",
    "SECRET_BROKER_KV_ENDPOINT",
    "SECRET_BROKER_KV_TOKEN",
    "SECRET_BROKER_ACTOR",
];

/// Run `f` with the given variables set, restoring the originals afterwards.
fn with_env<T>(pairs: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<String>)> = VARS.iter().map(|name| (*name, env::var(name).ok())).collect();

    for name in VARS {
        env::remove_var(name);
    }
    for (name, value) in pairs {
        env::set_var(name, value);
    }

    let result = f();

    for (name, value) in saved {
        match value {
            Some(value) => env::set_var(name, value),
            None => env::remove_var(name),
        }
    }
    result
}

#[test]
fn test_config_environment_integration() -> Result<()> {
    let config = with_env(
        &[
            ("SECRET_BROKER_PROVIDER", "kv-store"),
            ("SECRET_BROKER_KV_ENDPOINT", "http://127.0.0.1:8200"),
            ("SECRET_BROKER_KV_TOKEN", "root-token"),
            ("SECRET_BROKER_CACHE_TTL_SECONDS", "120"),
            ("SECRET_BROKER_ACTOR", "release-pipeline"),
        ],
        AppConfig::from_env,
    )?;

    assert_eq!(config.broker.provider_kind(), ProviderKind::KvStore);
    assert_eq!(config.broker.cache_ttl().as_secs(), 120);
    assert_eq!(config.broker.actor.as_deref(), Some("release-pipeline"));
    match config.broker.backend_config()? {
        BackendConfig::KvStore(kv) => {
            assert_eq!(kv.endpoint, "http://127.0.0.1:8200");
            assert_eq!(kv.mount, "secret");
        }
        other => panic!("unexpected backend {other:?}"),
    }
    Ok(())
}

#[test]
fn test_invalid_environment_is_rejected() {
    let result = with_env(
        &[("SECRET_BROKER_PROVIDER", "memory"), ("SECRET_BROKER_CACHE_TTL_SECONDS", "0")],
        AppConfig::from_env,
    );
    assert!(result.is_err());

    let result = with_env(
        &[("SECRET_BROKER_PROVIDER", "composite"), ("SECRET_BROKER_COMPOSITE_PRIMARY", "composite")],
        AppConfig::from_env,
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_composite_config_builds_broker() -> Result<()> {
    let config = with_env(
        &[
            ("SECRET_BROKER_PROVIDER", "composite"),
            ("SECRET_BROKER_COMPOSITE_PRIMARY", "memory"),
            ("SECRET_BROKER_COMPOSITE_FALLBACKS", "env"),
        ],
        AppConfig::from_env,
    )?;

    let backend = config.broker.backend_config()?;
    let broker = SecretBroker::from_backend(&backend, config.broker.broker_options()).await?;
    assert_eq!(broker.provider(), ProviderKind::Composite);

    broker.initialize().await?;
    assert!(broker.is_initialized());
    broker.close().await?;
    Ok(())
}
