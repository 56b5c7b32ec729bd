//! # Configuration Management
//!
//! Configuration is read once at startup from `SECRET_BROKER_*` environment
//! variables and never re-read. The binary loads a `.env` file first.
//!
//! | variable | default |
//! |---|---|
//! | `SECRET_BROKER_PROVIDER` | `cluster` |
//! | `SECRET_BROKER_NAMESPACE` | `default` |
//! | `SECRET_BROKER_CLUSTER_API` | from `KUBERNETES_SERVICE_HOST`/`_PORT` |
//! | `SECRET_BROKER_CLUSTER_TOKEN_PATH`, `SECRET_BROKER_CLUSTER_CA_PATH` | service-account files when in-cluster |
//! | `SECRET_BROKER_KV_ENDPOINT`, `SECRET_BROKER_KV_TOKEN`, `SECRET_BROKER_KV_NAMESPACE` | |
//! | `SECRET_BROKER_KV_MOUNT` | `secret` |
//! | `SECRET_BROKER_CLOUD_REGION`, `SECRET_BROKER_CLOUD_KEY_ID`, `SECRET_BROKER_CLOUD_ENDPOINT` | |
//! | `SECRET_BROKER_COMPOSITE_PRIMARY` | |
//! | `SECRET_BROKER_COMPOSITE_FALLBACKS` | `env` |
//! | `SECRET_BROKER_CACHE_TTL_SECONDS` | `300` |
//! | `SECRET_BROKER_ENFORCE_VALIDATION` | `false` |
//! | `SECRET_BROKER_ENVIRONMENT` | `development` |
//! | `SECRET_BROKER_ACTOR` | |
//! | `SECRET_BROKER_LOG_LEVEL` | `info` |
//! | `SECRET_BROKER_JSON_LOGS` | `false` |
//! | `SECRET_BROKER_METRICS_PORT` | `0` (disabled) |

pub mod settings;

pub use settings::{AppConfig, BrokerConfig, Environment, ObservabilityConfig};

use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::{Error, Result};
use crate::secrets::backends::cluster::{DEFAULT_CA_PATH, DEFAULT_TOKEN_PATH};
use crate::secrets::backends::ProviderParams;
use crate::secrets::{ProviderKind, SecretString};

pub const ENV_PREFIX: &str = "SECRET_BROKER_";

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_provider(None)
    }

    /// Load from the process environment, with `provider` taking precedence
    /// over `SECRET_BROKER_PROVIDER`.
    pub fn from_env_with_provider(provider: Option<ProviderKind>) -> Result<Self> {
        Self::load(|name| std::env::var(name).ok(), provider)
    }

    /// Load from an arbitrary variable source and validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::load(lookup, None)
    }

    fn load<F>(lookup: F, provider: Option<ProviderKind>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);
        let mut config = Self {
            broker: broker_from(&vars, &lookup)?,
            observability: observability_from(&vars)?,
        };
        if provider.is_some() {
            config.broker.provider = provider;
        }
        config.validate()?;
        Ok(config)
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(name)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| {
                    Error::validation_field(
                        format!("Invalid value for {ENV_PREFIX}{name}: {e}"),
                        name.to_ascii_lowercase(),
                    )
                })
            })
            .transpose()
    }

    fn flag(&self, name: &str) -> Result<bool> {
        match self.get(name).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(false),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(v) => Err(Error::validation_field(
                format!("Invalid boolean for {ENV_PREFIX}{name}: {v}"),
                name.to_ascii_lowercase(),
            )),
        }
    }
}

fn broker_from<F>(vars: &Vars<'_, F>, lookup: &F) -> Result<BrokerConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = BrokerConfig::default();

    // Inside a pod the API server and service-account files are well known.
    let in_cluster_api = lookup("KUBERNETES_SERVICE_HOST").map(|host| {
        let port = lookup("KUBERNETES_SERVICE_PORT").unwrap_or_else(|| "443".to_string());
        format!("https://{host}:{port}")
    });
    let in_cluster = in_cluster_api.is_some();

    let composite_fallbacks = match vars.get("COMPOSITE_FALLBACKS") {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ProviderKind::from_str)
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => defaults.params.composite_fallbacks.clone(),
    };

    let params = ProviderParams {
        namespace: vars.get("NAMESPACE").unwrap_or(defaults.params.namespace),
        cluster_api: vars.get("CLUSTER_API").or(in_cluster_api),
        cluster_token_path: vars
            .get("CLUSTER_TOKEN_PATH")
            .or_else(|| in_cluster.then(|| DEFAULT_TOKEN_PATH.to_string()))
            .map(PathBuf::from),
        cluster_ca_path: vars
            .get("CLUSTER_CA_PATH")
            .or_else(|| in_cluster.then(|| DEFAULT_CA_PATH.to_string()))
            .map(PathBuf::from),
        kv_endpoint: vars.get("KV_ENDPOINT"),
        kv_token: vars.get("KV_TOKEN").map(SecretString::new),
        kv_mount: vars.get("KV_MOUNT").unwrap_or(defaults.params.kv_mount),
        kv_namespace: vars.get("KV_NAMESPACE"),
        cloud_region: vars.get("CLOUD_REGION"),
        cloud_key_id: vars.get("CLOUD_KEY_ID"),
        cloud_endpoint: vars.get("CLOUD_ENDPOINT"),
        composite_primary: vars.parse::<ProviderKind>("COMPOSITE_PRIMARY")?,
        composite_fallbacks,
        env_prefix: defaults.params.env_prefix,
    };

    Ok(BrokerConfig {
        provider: vars.parse::<ProviderKind>("PROVIDER")?,
        params,
        cache_ttl_seconds: vars.parse::<u64>("CACHE_TTL_SECONDS")?.unwrap_or(defaults.cache_ttl_seconds),
        enforce_validation: vars.flag("ENFORCE_VALIDATION")?,
        environment: vars.parse::<Environment>("ENVIRONMENT")?.unwrap_or_default(),
        actor: vars.get("ACTOR"),
    })
}

fn observability_from<F>(vars: &Vars<'_, F>) -> Result<ObservabilityConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = ObservabilityConfig::default();
    Ok(ObservabilityConfig {
        metrics_port: vars.parse::<u16>("METRICS_PORT")?.unwrap_or(defaults.metrics_port),
        service_name: defaults.service_name,
        log_level: vars.get("LOG_LEVEL").unwrap_or(defaults.log_level),
        json_logging: vars.flag("JSON_LOGS")?,
    })
}
