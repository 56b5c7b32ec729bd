//! Per-key TTL cache in front of the secret store.
//!
//! An entry is the last value this process observed from the store (including
//! "absent"); it is never a guess. Hits are served synchronously from a
//! [`DashMap`], misses and expired entries go to the store. A store failure
//! degrades to the last known value when one exists.
//!
//! There is no request coalescing: concurrent misses on the same key each
//! reach the store. There is no size bound either; entries live until they
//! are invalidated, replaced or the cache is cleared.

use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::audit::AuditSource;
use super::store::SecretStore;
use super::types::SecretValue;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Option<SecretValue>,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Outcome of a cached read, keeping apart the cases a plain `Option` would
/// conflate.
#[derive(Debug, Clone, PartialEq)]
pub enum SecretLookup {
    /// Served from a fresh cache entry, no store call.
    Cached(SecretValue),
    /// Fetched from the store just now.
    Fresh(SecretValue),
    /// The store failed; this is the last value seen before the failure.
    Stale { value: SecretValue, error: String },
    /// The store says the key does not exist (possibly remembered from an
    /// earlier fetch still within TTL).
    Absent { from_cache: bool },
    /// The store failed and there is no earlier value to fall back to.
    Unavailable { error: String },
}

impl SecretLookup {
    pub fn value(&self) -> Option<&SecretValue> {
        match self {
            Self::Cached(value) | Self::Fresh(value) | Self::Stale { value, .. } => Some(value),
            Self::Absent { .. } | Self::Unavailable { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<SecretValue> {
        match self {
            Self::Cached(value) | Self::Fresh(value) | Self::Stale { value, .. } => Some(value),
            Self::Absent { .. } | Self::Unavailable { .. } => None,
        }
    }

    /// The store error behind a degraded read.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Stale { error, .. } | Self::Unavailable { error } => Some(error),
            _ => None,
        }
    }

    /// Where the answer came from, for the audit trail.
    pub fn source(&self) -> AuditSource {
        match self {
            Self::Cached(_) | Self::Stale { .. } | Self::Absent { from_cache: true } => {
                AuditSource::Cache
            }
            Self::Fresh(_) | Self::Absent { from_cache: false } | Self::Unavailable { .. } => {
                AuditSource::Backend
            }
        }
    }

    /// False when the store failed, whether or not a fallback was served.
    pub fn is_success(&self) -> bool {
        self.error().is_none()
    }

    /// Short label used in metrics and CLI output.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Cached(_) => "cached",
            Self::Fresh(_) => "fresh",
            Self::Stale { .. } => "stale",
            Self::Absent { .. } => "absent",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub fresh: usize,
    pub expired: usize,
    pub ttl_seconds: u64,
}

#[derive(Debug)]
pub struct SecretCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl SecretCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The entry for `key` if it is still within TTL. `Some(None)` is a
    /// remembered "absent".
    pub fn fresh(&self, key: &str) -> Option<Option<SecretValue>> {
        let entry = self.entries.get(key)?;
        if entry.is_fresh(self.ttl) {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// The entry for `key` regardless of age.
    pub fn last_known(&self, key: &str) -> Option<Option<SecretValue>> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn store(&self, key: &str, value: Option<SecretValue>) {
        self.entries.insert(key.to_string(), CacheEntry { value, fetched_at: Instant::now() });
    }

    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            debug!(key = %key, "Invalidated cached secret");
        }
        removed
    }

    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        debug!(entries = count, "Cleared secret cache");
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let fresh = self.entries.iter().filter(|entry| entry.is_fresh(self.ttl)).count();
        let entries = self.entries.len();
        CacheStats {
            entries,
            fresh,
            expired: entries.saturating_sub(fresh),
            ttl_seconds: self.ttl.as_secs(),
        }
    }

    /// Serve `key` from cache, or fetch it from `store` and remember the result.
    pub async fn read_through(&self, key: &str, store: &dyn SecretStore) -> SecretLookup {
        if let Some(hit) = self.fresh(key) {
            debug!(key = %key, "Secret cache hit");
            return match hit {
                Some(value) => SecretLookup::Cached(value),
                None => SecretLookup::Absent { from_cache: true },
            };
        }

        match store.get(key).await {
            Ok(value) => {
                self.store(key, value.clone());
                match value {
                    Some(value) => SecretLookup::Fresh(value),
                    None => SecretLookup::Absent { from_cache: false },
                }
            }
            Err(e) => {
                let error = e.to_string();
                match self.last_known(key) {
                    Some(Some(value)) => {
                        warn!(key = %key, error = %error, "Secret store read failed, serving last known value");
                        SecretLookup::Stale { value, error }
                    }
                    _ => {
                        warn!(key = %key, error = %error, "Secret store read failed with no cached fallback");
                        SecretLookup::Unavailable { error }
                    }
                }
            }
        }
    }
}

impl Default for SecretCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
