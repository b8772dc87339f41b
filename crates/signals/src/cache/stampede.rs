//! Single-flight get-or-compute cache.
//!
//! On a miss the caller tries to take an advisory lock key with a short
//! expiry. The winner computes and stores the value; everyone else polls
//! the cache for a bounded time and then computes on their own. The lock
//! only saves work: compute functions must be pure and idempotent, so a
//! duplicate computation is always acceptable.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use confluence_core::{CacheConfig, DataClass};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::key::{build_key, lock_key};
use super::metrics::{CacheMetrics, CacheMetricsSnapshot};
use super::store::{CacheStore, ResilientStore};

/// Stampede-protected cache over a [`ResilientStore`].
///
/// Owned by the composition root and shared through an `Arc`.
pub struct StampedeCache {
    store: ResilientStore,
    metrics: Arc<CacheMetrics>,
    config: CacheConfig,
}

impl StampedeCache {
    /// Cache backed by the in-process store only.
    #[must_use]
    pub fn local(config: CacheConfig) -> Self {
        let metrics = Arc::new(CacheMetrics::default());
        Self {
            store: ResilientStore::local(Arc::clone(&metrics)),
            metrics,
            config,
        }
    }

    /// Cache backed by a shared `primary` store, with in-process fallback.
    #[must_use]
    pub fn with_primary(config: CacheConfig, primary: Arc<dyn CacheStore>) -> Self {
        let metrics = Arc::new(CacheMetrics::default());
        Self {
            store: ResilientStore::with_primary(primary, Arc::clone(&metrics)),
            metrics,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Key for one indicator result under this cache's namespace.
    #[must_use]
    pub fn key(&self, symbol: &str, component: &str, params: &Value) -> String {
        build_key(&self.config.namespace, symbol, component, params)
    }

    /// TTL configured for a data class.
    #[must_use]
    pub fn ttl_for(&self, class: DataClass) -> Duration {
        self.config.ttl.ttl_for(class)
    }

    #[must_use]
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, compute: F, ttl: Duration) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let result = self
            .try_get_or_compute(
                key,
                move || async move { Ok::<T, Infallible>(compute().await) },
                ttl,
            )
            .await;
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_compute`](Self::get_or_compute) for fallible computations.
    ///
    /// Errors from `compute` are returned and never cached. Store failures
    /// are absorbed and never returned.
    ///
    /// # Errors
    /// Returns the error produced by `compute`.
    pub async fn try_get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        compute: F,
        ttl: Duration,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        if let Some(value) = self.lookup(key).await {
            self.metrics.record_hit(started.elapsed());
            return Ok(value);
        }
        self.metrics.record_miss();

        let lock = lock_key(key);
        let acquired = self
            .store
            .add(&lock, Value::Bool(true), self.config.lock_ttl())
            .await
            .unwrap_or(true);

        if acquired {
            let result = self.compute_and_store(key, compute, ttl).await;
            let _ = self.store.delete(&lock).await;
            return result;
        }

        self.metrics.record_lock_wait();
        tracing::debug!(key = %key, "Lock held elsewhere, waiting for result");
        if let Some(deadline) = started.checked_add(self.config.lock_wait()) {
            while Instant::now() < deadline {
                tokio::time::sleep(self.config.lock_poll()).await;
                if let Some(value) = self.lookup(key).await {
                    self.metrics.record_hit(started.elapsed());
                    return Ok(value);
                }
            }
        }

        self.metrics.record_lock_timeout();
        tracing::warn!(
            key = %key,
            waited_ms = self.config.lock_wait_ms,
            "Timed out waiting for lock holder, computing independently"
        );
        self.compute_and_store(key, compute, ttl).await
    }

    async fn compute_and_store<T, E, F, Fut>(
        &self,
        key: &str,
        compute: F,
        ttl: Duration,
    ) -> Result<T, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let value = compute().await?;
        self.metrics.record_compute(started.elapsed());

        match serde_json::to_value(&value) {
            Ok(encoded) => {
                let _ = self.store.set(key, encoded, ttl).await;
            }
            Err(e) => {
                self.metrics.record_error();
                tracing::warn!(key = %key, error = %e, "Value not serializable, not cached");
            }
        }
        Ok(value)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key).await.ok().flatten()?;
        match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                self.metrics.record_error();
                tracing::warn!(key = %key, error = %e, "Cached value has unexpected shape, ignoring");
                None
            }
        }
    }
}
