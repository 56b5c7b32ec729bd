//! Error types for secret broker operations.

use thiserror::Error;

/// Result type for secret broker operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors raised by secret stores and the broker.
///
/// Read paths absorb most of these (see [`SecretLookup`](super::cache::SecretLookup));
/// write paths always surface them to the caller.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// Store reports the key does not exist.
    #[error("Secret not found: {key}")]
    NotFound { key: String },

    /// The store could not be reached.
    #[error("Backend connection failed: {message}")]
    ConnectionFailed { message: String },

    /// The store rejected our credentials.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Key name is empty or contains characters no store accepts.
    #[error("Invalid secret key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Candidate value rejected by validation policy.
    #[error("Invalid secret value: {reason}")]
    InvalidValue { reason: String },

    /// Rotation could not produce or persist a new value.
    #[error("Rotation failed for secret '{key}': {reason}")]
    RotationFailed { key: String, reason: String },

    /// The store does not implement this operation (e.g. a read-only store).
    #[error("Operation '{operation}' is not supported by the {provider} provider")]
    Unsupported { operation: String, provider: String },

    /// Store-specific failure.
    #[error("Backend error: {message}")]
    BackendError { message: String },

    /// Provider configuration is incomplete or inconsistent.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP request error (for REST-based stores).
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Broker misuse, e.g. calling into a closed broker.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SecretsError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: message.into() }
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: message.into() }
    }

    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey { key: key.into(), reason: reason.into() }
    }

    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Self::InvalidValue { reason: reason.into() }
    }

    pub fn rotation_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RotationFailed { key: key.into(), reason: reason.into() }
    }

    pub fn unsupported(operation: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::Unsupported { operation: operation.into(), provider: provider.into() }
    }

    pub fn backend_error(message: impl Into<String>) -> Self {
        Self::BackendError { message: message.into() }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// True when the store positively reported the key as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for errors caused by the caller rather than the store.
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::InvalidKey { .. } | Self::Internal { .. })
    }
}

impl From<reqwest::Error> for SecretsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::connection_failed(err.to_string())
        } else {
            Self::HttpError(err.to_string())
        }
    }
}
