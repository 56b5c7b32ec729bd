//! # Secrets
//!
//! The broker core: a pluggable credential store behind a per-key TTL cache,
//! with an audit trail, value validation and secret generation.
//!
//! # Architecture
//!
//! - [`SecretStore`]: the capability contract every backend satisfies
//!   (`get`, `set`, `delete`, `rotate`, `health`, `warmup`)
//! - [`backends`]: concrete stores and the selector that picks one from
//!   configuration
//! - [`SecretCache`]: TTL cache that degrades to the last known value when
//!   the store fails
//! - [`SecretBroker`]: the public entry point, owning store, cache and
//!   audit sink for the life of the process
//! - [`DomainSecrets`]: typed bundles (database, cache store, TLS,
//!   monitoring, backup) built from broker reads
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use secret_broker::secrets::{BrokerOptions, SecretBroker, SecretValue};
//! use secret_broker::secrets::backends::MemorySecretStore;
//!
//! let broker = SecretBroker::new(Arc::new(MemorySecretStore::new()), BrokerOptions::default());
//! broker.initialize().await?;
//!
//! broker.set_secret("api-key-stripe", &SecretValue::text("sk_live_..."), None).await?;
//! let value = broker.get_secret("api-key-stripe").await?;
//!
//! broker.close().await?;
//! ```
//!
//! # Security
//!
//! - Secret values are never logged; audit events carry key names only
//! - [`SecretString`] redacts its `Debug`, `Display` and serialized forms
//!   and zeroes its buffer on drop

pub mod accessors;
pub mod audit;
pub mod backends;
pub mod broker;
pub mod cache;
pub mod error;
pub mod generator;
pub mod keys;
pub mod store;
pub mod types;
pub mod validator;

pub use accessors::{
    BackupCredentials, CacheStoreConfig, DatabaseConfig, DomainSecrets, MonitoringCredentials,
    SecretPresence, TlsMaterial,
};
pub use audit::{
    AuditEvent, AuditOperation, AuditSink, AuditSource, FanoutAuditSink, MemoryAuditSink,
    TracingAuditSink,
};
pub use backends::{select_store, BackendConfig, ProviderParams};
pub use broker::{BrokerOptions, BrokerState, SecretBroker, WarmupReport, PREVIEW_LEN};
pub use cache::{CacheStats, SecretCache, SecretLookup, DEFAULT_TTL};
pub use error::{Result, SecretsError};
pub use generator::{SecretGenerator, SecretKind};
pub use keys::{validate_key, SecretKey, CRITICAL_KEYS};
pub use store::{HealthStatus, ProviderKind, SecretStore};
pub use types::{SecretMetadata, SecretString, SecretValue};
pub use validator::{SecretValidator, ValidationRejection};
