//! Secret key names.
//!
//! Keys are plain strings. A fixed set of well-known names is used by the
//! warmup set and the domain accessors; any other valid name is a custom key.

use std::fmt;

use super::error::{Result, SecretsError};

pub const DATABASE_URL: &str = "database-url";
pub const DATABASE_PASSWORD: &str = "database-password";
pub const JWT_SECRET: &str = "jwt-secret";
pub const ENCRYPTION_KEY: &str = "encryption-key";

pub const CACHE_STORE: &str = "cache-store";
pub const CACHE_STORE_TLS_CERT: &str = "cache-store-tls-cert";

pub const TLS_PRIVATE_KEY: &str = "tls-private-key";
pub const TLS_CERTIFICATE: &str = "tls-certificate";
pub const TLS_CA_BUNDLE: &str = "tls-ca-bundle";

pub const MONITORING_CREDENTIALS: &str = "monitoring-credentials";
pub const BACKUP_CREDENTIALS: &str = "backup-credentials";

const API_KEY_PREFIX: &str = "api-key-";
const WEBHOOK_SECRET_PREFIX: &str = "webhook-secret-";

/// Secrets prefetched by `initialize()` and `refresh_secrets()`. Not configurable.
pub const CRITICAL_KEYS: [&str; 3] = [DATABASE_URL, JWT_SECRET, ENCRYPTION_KEY];

const MAX_KEY_LEN: usize = 253;

/// A parsed secret key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SecretKey {
    DatabaseUrl,
    DatabasePassword,
    JwtSecret,
    EncryptionKey,
    /// Per-integration API key, e.g. `api-key-stripe`.
    ApiKey(String),
    /// Per-integration webhook shared secret, e.g. `webhook-secret-github`.
    WebhookSecret(String),
    Custom(String),
}

impl SecretKey {
    pub fn api_key(service: &str) -> Self {
        Self::ApiKey(service.to_string())
    }

    pub fn webhook_secret(service: &str) -> Self {
        Self::WebhookSecret(service.to_string())
    }

    /// Classify a raw key name. Never fails; unknown names are `Custom`.
    pub fn parse(name: &str) -> Self {
        match name {
            DATABASE_URL => Self::DatabaseUrl,
            DATABASE_PASSWORD => Self::DatabasePassword,
            JWT_SECRET => Self::JwtSecret,
            ENCRYPTION_KEY => Self::EncryptionKey,
            _ => {
                if let Some(service) = name.strip_prefix(API_KEY_PREFIX).filter(|s| !s.is_empty()) {
                    Self::ApiKey(service.to_string())
                } else if let Some(service) =
                    name.strip_prefix(WEBHOOK_SECRET_PREFIX).filter(|s| !s.is_empty())
                {
                    Self::WebhookSecret(service.to_string())
                } else {
                    Self::Custom(name.to_string())
                }
            }
        }
    }

    /// The storage name of this key.
    pub fn name(&self) -> String {
        match self {
            Self::DatabaseUrl => DATABASE_URL.to_string(),
            Self::DatabasePassword => DATABASE_PASSWORD.to_string(),
            Self::JwtSecret => JWT_SECRET.to_string(),
            Self::EncryptionKey => ENCRYPTION_KEY.to_string(),
            Self::ApiKey(service) => format!("{API_KEY_PREFIX}{service}"),
            Self::WebhookSecret(service) => format!("{WEBHOOK_SECRET_PREFIX}{service}"),
            Self::Custom(name) => name.clone(),
        }
    }

    pub fn is_well_known(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Self::DatabaseUrl | Self::JwtSecret | Self::EncryptionKey)
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl From<&str> for SecretKey {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

/// Reject key names no store could hold.
///
/// Allowed: ASCII letters, digits, `-`, `_`, `.` and `/`, at most 253 bytes,
/// no leading `/` and no `..` segments.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SecretsError::invalid_key(key, "key cannot be empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(SecretsError::invalid_key(
            key,
            format!("key exceeds {MAX_KEY_LEN} characters"),
        ));
    }
    if let Some(c) =
        key.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')))
    {
        return Err(SecretsError::invalid_key(key, format!("character {c:?} is not allowed")));
    }
    if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
        return Err(SecretsError::invalid_key(key, "key must be a relative path"));
    }
    Ok(())
}

/// Validate an integration service name used in `api-key-*` / `webhook-secret-*`.
pub fn validate_service_name(service: &str) -> Result<()> {
    if service.is_empty()
        || !service.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SecretsError::invalid_key(
            service,
            "service names may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_known_keys() {
        assert_eq!(SecretKey::parse("database-url"), SecretKey::DatabaseUrl);
        assert_eq!(SecretKey::parse("jwt-secret"), SecretKey::JwtSecret);
        assert_eq!(SecretKey::parse("api-key-stripe"), SecretKey::api_key("stripe"));
        assert_eq!(SecretKey::parse("webhook-secret-github"), SecretKey::webhook_secret("github"));
        assert_eq!(SecretKey::parse("api-key-"), SecretKey::Custom("api-key-".into()));
        assert_eq!(SecretKey::parse("feature-flags"), SecretKey::Custom("feature-flags".into()));
    }

    #[test]
    fn test_name_inverts_parse() {
        for name in ["database-url", "encryption-key", "api-key-sendgrid", "webhook-secret-x", "misc"] {
            assert_eq!(SecretKey::parse(name).name(), name);
        }
    }

    #[test]
    fn test_critical_keys_are_well_known() {
        for key in CRITICAL_KEYS {
            let parsed = SecretKey::parse(key);
            assert!(parsed.is_well_known());
            assert!(parsed.is_critical());
        }
        assert!(!SecretKey::DatabasePassword.is_critical());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("api-key-stripe").is_ok());
        assert!(validate_key("team/payments/db_password.v2").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("has space").is_err());
        assert!(validate_key("/absolute").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key(&"k".repeat(254)).is_err());
    }

    #[test]
    fn test_validate_service_name() {
        assert!(validate_service_name("stripe").is_ok());
        assert!(validate_service_name("google_maps-v3").is_ok());
        assert!(validate_service_name("").is_err());
        assert!(validate_service_name("a/b").is_err());
    }
}
