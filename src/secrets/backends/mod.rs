//! Concrete secret stores and the selector that picks one.
//!
//! ## Supported providers
//!
//! - **cluster**: Kubernetes `Secret` objects (default)
//! - **kv-store**: HashiCorp Vault KV v2
//! - **cloud-kms**: AWS Secrets Manager with a KMS key (feature `aws`)
//! - **composite**: a primary store with read-only fallbacks
//! - **env**: environment variables, read-only, development only
//! - **memory**: in-process map, development and tests

#[cfg(feature = "aws")]
pub mod cloud_kms;
pub mod cluster;
pub mod composite;
pub mod env;
pub mod kv;
pub mod memory;
pub mod selector;

#[cfg(feature = "aws")]
pub use cloud_kms::CloudKmsStore;
pub use cluster::{ClusterConfig, ClusterSecretStore};
pub use composite::CompositeSecretStore;
pub use env::{EnvSecretStore, EnvStoreConfig};
pub use kv::{KvStoreConfig, VaultKvStore};
pub use memory::MemorySecretStore;
pub use selector::{select_store, BackendConfig, CloudKmsConfig, ProviderParams};
