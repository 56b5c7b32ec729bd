//! # Secret Broker
//!
//! A process-wide broker between application code and an external credential
//! store. It caches reads per key with a TTL, degrades to the last known value
//! when the store fails, records one audit event per operation, validates
//! candidate values and generates new secret material.
//!
//! ## Architecture
//!
//! ```text
//! Domain accessors / CLI → SecretBroker → SecretCache → SecretStore (cluster | kv-store | cloud-kms | composite)
//!                               ↓
//!                           AuditSink
//! ```
//!
//! ## Core Components
//!
//! - **Secret stores**: Kubernetes Secrets, Vault KV v2, AWS Secrets Manager
//!   with a KMS key (feature `aws`), a composite with read fallbacks, and
//!   environment/in-memory stores for development
//! - **Broker**: owns the single store handle, cache and audit sink; tied to
//!   `initialize`/`close`
//! - **Domain accessors**: database, cache-store, TLS, monitoring and backup
//!   bundles assembled from independent reads
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use secret_broker::{AppConfig, Result, SecretBroker};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let backend = config.broker.backend_config()?;
//!     let broker = SecretBroker::from_backend(&backend, config.broker.broker_options()).await?;
//!     broker.initialize().await?;
//!
//!     let signing_key = broker.get_secret_text("jwt-secret").await?;
//!     assert!(signing_key.is_some());
//!
//!     broker.close().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod secrets;

// Re-export commonly used types and traits
pub use config::{AppConfig, Environment};
pub use errors::{Error, Result};
pub use observability::init_observability;
pub use secrets::{
    BrokerOptions, DomainSecrets, SecretBroker, SecretLookup, SecretString, SecretValue,
};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
