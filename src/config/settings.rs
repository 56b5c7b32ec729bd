//! # Configuration Settings
//!
//! Typed settings for the broker and its observability stack, validated with
//! the `validator` crate plus a few cross-field checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

use crate::errors::{Error, Result};
use crate::secrets::backends::{BackendConfig, ProviderParams};
use crate::secrets::{BrokerOptions, ProviderKind};

/// Deployment environment. Drives the database bundle's TLS flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "staging" | "stage" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(Error::validation_field(
                format!("Unknown environment '{other}' (expected development, staging or production)"),
                "environment",
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub broker: BrokerConfig,

    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()
    }

    /// Checks the validator derive cannot express.
    fn validate_custom(&self) -> Result<()> {
        // surfaces missing provider parameters before any store is built
        self.broker.backend_config()?;
        Ok(())
    }
}

/// Secret broker configuration
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct BrokerConfig {
    /// Selected provider; `None` means the cluster-native store.
    pub provider: Option<ProviderKind>,

    /// Provider-specific parameters.
    pub params: ProviderParams,

    /// Cache freshness window in seconds
    #[validate(range(min = 1, max = 86400, message = "Cache TTL must be between 1 and 86400 seconds"))]
    pub cache_ttl_seconds: u64,

    /// Reject values that fail the validator inside `set_secret`
    pub enforce_validation: bool,

    pub environment: Environment,

    /// Recorded on audit events
    #[validate(length(min = 1, max = 128, message = "Actor must be 1-128 characters"))]
    pub actor: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            provider: None,
            params: ProviderParams::default(),
            cache_ttl_seconds: 300,
            enforce_validation: false,
            environment: Environment::default(),
            actor: None,
        }
    }
}

impl BrokerConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.unwrap_or_default()
    }

    pub fn broker_options(&self) -> BrokerOptions {
        BrokerOptions {
            cache_ttl: self.cache_ttl(),
            enforce_validation: self.enforce_validation,
            actor: self.actor.clone(),
        }
    }

    /// Resolve the provider and its parameters into a store configuration.
    pub fn backend_config(&self) -> Result<BackendConfig> {
        Ok(BackendConfig::resolve(self.provider, &self.params)?)
    }
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Prometheus exporter port (0 = disabled)
    pub metrics_port: u16,

    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_port: 0,
            service_name: crate::APP_NAME.to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port != 0
    }

    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_enabled() {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_needs_cluster_api() {
        // the default provider is the cluster store, which needs an API server
        let config = AppConfig::default();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.broker.provider = Some(ProviderKind::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ttl_range_is_enforced() {
        let mut config = AppConfig::default();
        config.broker.provider = Some(ProviderKind::Memory);
        config.broker.cache_ttl_seconds = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Cache TTL"));
    }

    #[test]
    fn test_broker_options_follow_config() {
        let config = BrokerConfig {
            cache_ttl_seconds: 30,
            enforce_validation: true,
            actor: Some("ops".into()),
            ..BrokerConfig::default()
        };
        let options = config.broker_options();
        assert_eq!(options.cache_ttl, Duration::from_secs(30));
        assert!(options.enforce_validation);
        assert_eq!(options.actor.as_deref(), Some("ops"));
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!(" Staging ".parse::<Environment>().unwrap(), Environment::Staging);
        assert!("qa".parse::<Environment>().is_err());
        assert!(Environment::Production.is_production());
        assert!(!Environment::default().is_production());
    }

    #[test]
    fn test_metrics_bind_address() {
        let mut config = ObservabilityConfig::default();
        assert_eq!(config.metrics_bind_address(), None);
        config.metrics_port = 9464;
        assert_eq!(config.metrics_bind_address().as_deref(), Some("0.0.0.0:9464"));
    }
}
