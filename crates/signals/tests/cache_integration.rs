use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use confluence_core::CacheConfig;
use confluence_signals::cache::lock_key;
use confluence_signals::{CacheError, CacheStore, MemoryStore, StampedeCache};
use serde_json::{json, Value};

/// Backing store that refuses every operation.
struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
        Err(CacheError::Unavailable("connection reset".into()))
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("connection reset".into()))
    }

    async fn add(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("connection reset".into()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("connection reset".into()))
    }

    fn name(&self) -> &str {
        "unreachable"
    }
}

fn config() -> CacheConfig {
    CacheConfig {
        lock_wait_ms: 2_000,
        lock_poll_ms: 10,
        ..CacheConfig::default()
    }
}

async fn slow_compute(calls: &AtomicUsize, value: f64) -> f64 {
    calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    value
}

#[tokio::test]
async fn concurrent_callers_compute_once() {
    let cache = StampedeCache::local(config());
    let calls = AtomicUsize::new(0);
    let key = cache.key("BTCUSDT", "orderbook", &json!({"levels": 10}));
    let ttl = Duration::from_secs(60);

    let (a, b, c) = tokio::join!(
        cache.get_or_compute(&key, || slow_compute(&calls, 72.0), ttl),
        cache.get_or_compute(&key, || slow_compute(&calls, 72.0), ttl),
        cache.get_or_compute(&key, || slow_compute(&calls, 72.0), ttl),
    );

    assert_eq!((a, b, c), (72.0, 72.0, 72.0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let metrics = cache.metrics();
    assert_eq!(metrics.computes, 1);
    assert_eq!(metrics.lock_waits, 2);
    assert_eq!(metrics.hits, 2);
    assert_eq!(metrics.lock_timeouts, 0);
}

#[tokio::test]
async fn spawned_tasks_share_one_computation() {
    let cache = Arc::new(StampedeCache::local(config()));
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(60);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_compute(
                        "confluence:ETHUSDT:technical:abc",
                        || async move { slow_compute(&calls, 41.5).await },
                        ttl,
                    )
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 41.5);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_store_falls_back_to_memory() {
    let cache = StampedeCache::with_primary(config(), Arc::new(UnreachableStore));
    let calls = AtomicUsize::new(0);
    let ttl = Duration::from_secs(60);

    for _ in 0..2 {
        let value: f64 = cache
            .get_or_compute("k", || slow_compute(&calls, 64.0), ttl)
            .await;
        assert_eq!(value, 64.0);
    }

    // The fallback map served the second call
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let metrics = cache.metrics();
    assert!(metrics.errors > 0);
    assert_eq!(metrics.hits, 1);
}

#[tokio::test]
async fn stale_lock_only_costs_latency() {
    let primary = Arc::new(MemoryStore::new());
    primary
        .add(&lock_key("k"), Value::Bool(true), Duration::from_secs(60))
        .await
        .unwrap();
    let cache = StampedeCache::with_primary(
        CacheConfig {
            lock_wait_ms: 40,
            lock_poll_ms: 10,
            ..CacheConfig::default()
        },
        primary.clone(),
    );

    let value: u32 = cache
        .get_or_compute("k", || async { 9 }, Duration::from_secs(60))
        .await;

    assert_eq!(value, 9);
    assert_eq!(cache.metrics().lock_timeouts, 1);
    assert_eq!(primary.get("k").await.unwrap(), Some(json!(9)));
}

#[tokio::test]
async fn expired_entries_are_recomputed() {
    let cache = StampedeCache::local(config());
    let calls = AtomicUsize::new(0);
    let ttl = Duration::from_millis(20);

    let _: f64 = cache.get_or_compute("k", || slow_compute(&calls, 1.0), ttl).await;
    tokio::time::sleep(Duration::from_millis(40)).await;
    let _: f64 = cache.get_or_compute("k", || slow_compute(&calls, 1.0), ttl).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
