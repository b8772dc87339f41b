//! Cache backing stores.
//!
//! [`CacheStore`] is the contract for any key/value backend with TTLs and
//! an atomic create-if-absent. [`MemoryStore`] is the in-process
//! implementation; [`ResilientStore`] puts it behind an optional primary so
//! a failing backend degrades to local caching instead of surfacing errors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use confluence_core::EngineError;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use super::metrics::CacheMetrics;

// =============================================================================
// Contract
// =============================================================================

/// Failure of a backing store operation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    /// Store unreachable or refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Value could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<CacheError> for EngineError {
    fn from(err: CacheError) -> Self {
        EngineError::CacheUnavailable(err.to_string())
    }
}

/// Key/value store with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live value for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Stores `value` under `key`, replacing any existing entry.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<bool, CacheError>;

    /// Stores `value` only if `key` holds no live entry. Returns whether
    /// the value was stored. Must be atomic with respect to other callers.
    async fn add(&self, key: &str, value: Value, ttl: Duration) -> Result<bool, CacheError>;

    /// Removes `key`. Returns whether an entry existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Store name used in logs.
    fn name(&self) -> &str;
}

// =============================================================================
// In-process store
// =============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
    hits: u64,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Expiry used when `now + ttl` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Inserts between sweeps of expired entries.
pub const PURGE_INTERVAL: u64 = 256;

/// In-process map with passive expiry.
///
/// Expired entries are removed when they are next touched, and swept in
/// bulk every [`PURGE_INTERVAL`] inserts or by [`MemoryStore::purge_expired`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
    inserts: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    /// Times a live entry has been read.
    #[must_use]
    pub fn hits(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.hits)
    }

    fn get_sync(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(key)?;
        if entry.is_live(now) {
            entry.hits += 1;
            return Some(entry.value.clone());
        }
        entries.remove(key);
        None
    }

    fn insert_sync(&self, key: &str, value: Value, ttl: Duration, only_if_absent: bool) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if self.inserts.fetch_add(1, Ordering::Relaxed) % PURGE_INTERVAL == PURGE_INTERVAL - 1 {
            let before = entries.len();
            entries.retain(|_, e| e.is_live(now));
            tracing::trace!(purged = before - entries.len(), "Swept expired cache entries");
        }
        if only_if_absent && entries.get(key).is_some_and(|e| e.is_live(now)) {
            return false;
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now.checked_add(ttl).unwrap_or(now + FAR_FUTURE),
                hits: 0,
            },
        );
        true
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.get_sync(key))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<bool, CacheError> {
        Ok(self.insert_sync(key, value, ttl, false))
    }

    async fn add(&self, key: &str, value: Value, ttl: Duration) -> Result<bool, CacheError> {
        Ok(self.insert_sync(key, value, ttl, true))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// =============================================================================
// Resilient wrapper
// =============================================================================

/// Primary store with transparent in-process fallback.
///
/// Each operation goes to the primary when one is configured. If it fails
/// the error is counted and logged, and the same operation runs against
/// the local [`MemoryStore`]. No operation returns an error.
pub struct ResilientStore {
    primary: Option<Arc<dyn CacheStore>>,
    fallback: MemoryStore,
    metrics: Arc<CacheMetrics>,
}

impl ResilientStore {
    /// Local-only store.
    #[must_use]
    pub fn local(metrics: Arc<CacheMetrics>) -> Self {
        Self {
            primary: None,
            fallback: MemoryStore::new(),
            metrics,
        }
    }

    /// Store backed by `primary`, falling back to local memory on failure.
    #[must_use]
    pub fn with_primary(primary: Arc<dyn CacheStore>, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            primary: Some(primary),
            fallback: MemoryStore::new(),
            metrics,
        }
    }

    /// The local store used when the primary is absent or failing.
    #[must_use]
    pub fn fallback(&self) -> &MemoryStore {
        &self.fallback
    }

    fn record_failure(&self, op: &str, key: &str, err: &CacheError) {
        self.metrics.record_error();
        let store = self.primary.as_ref().map_or("none", |p| p.name());
        tracing::warn!(
            store = %store,
            op = %op,
            key = %key,
            error = %err,
            "Cache store failed, using in-process fallback"
        );
    }
}

#[async_trait]
impl CacheStore for ResilientStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        if let Some(primary) = &self.primary {
            match primary.get(key).await {
                Ok(value) => return Ok(value),
                Err(e) => self.record_failure("get", key, &e),
            }
        }
        Ok(self.fallback.get_sync(key))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<bool, CacheError> {
        if let Some(primary) = &self.primary {
            match primary.set(key, value.clone(), ttl).await {
                Ok(stored) => return Ok(stored),
                Err(e) => self.record_failure("set", key, &e),
            }
        }
        Ok(self.fallback.insert_sync(key, value, ttl, false))
    }

    async fn add(&self, key: &str, value: Value, ttl: Duration) -> Result<bool, CacheError> {
        if let Some(primary) = &self.primary {
            match primary.add(key, value.clone(), ttl).await {
                Ok(stored) => return Ok(stored),
                Err(e) => self.record_failure("add", key, &e),
            }
        }
        Ok(self.fallback.insert_sync(key, value, ttl, true))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        if let Some(primary) = &self.primary {
            match primary.delete(key).await {
                Ok(existed) => return Ok(existed),
                Err(e) => self.record_failure("delete", key, &e),
            }
        }
        Ok(self.fallback.entries.lock().remove(key).is_some())
    }

    fn name(&self) -> &str {
        "resilient"
    }
}
