//! Cache counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lock-free counters shared by the cache and its store.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    lock_waits: AtomicU64,
    lock_timeouts: AtomicU64,
    computes: AtomicU64,
    hit_nanos: AtomicU64,
    compute_nanos: AtomicU64,
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl CacheMetrics {
    pub fn record_hit(&self, latency: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.hit_nanos.fetch_add(nanos(latency), Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_wait(&self) {
        self.lock_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compute(&self, elapsed: Duration) {
        self.computes.fetch_add(1, Ordering::Relaxed);
        self.compute_nanos.fetch_add(nanos(elapsed), Ordering::Relaxed);
    }

    /// Point-in-time copy with derived averages.
    #[must_use]
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let computes = self.computes.load(Ordering::Relaxed);
        let avg_ms = |total: u64, n: u64| {
            if n == 0 {
                0.0
            } else {
                total as f64 / n as f64 / 1_000_000.0
            }
        };
        let avg_hit_latency_ms = avg_ms(self.hit_nanos.load(Ordering::Relaxed), hits);
        let avg_compute_ms = avg_ms(self.compute_nanos.load(Ordering::Relaxed), computes);

        CacheMetricsSnapshot {
            hits,
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            lock_waits: self.lock_waits.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            computes,
            avg_hit_latency_ms,
            avg_compute_ms,
            speedup: if avg_hit_latency_ms > 0.0 {
                avg_compute_ms / avg_hit_latency_ms
            } else {
                0.0
            },
        }
    }
}

/// Serializable view of [`CacheMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// Backing store failures absorbed by the fallback
    pub errors: u64,
    pub lock_waits: u64,
    pub lock_timeouts: u64,
    pub computes: u64,
    pub avg_hit_latency_ms: f64,
    pub avg_compute_ms: f64,
    /// `avg_compute_ms / avg_hit_latency_ms`, 0 when undefined
    pub speedup: f64,
}

impl CacheMetricsSnapshot {
    /// Share of lookups served from cache.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_no_averages() {
        let snap = CacheMetrics::default().snapshot();
        assert_eq!(snap, CacheMetricsSnapshot::default());
        assert_eq!(snap.hit_rate(), 0.0);
    }

    #[test]
    fn averages_and_speedup() {
        let m = CacheMetrics::default();
        m.record_hit(Duration::from_millis(1));
        m.record_hit(Duration::from_millis(3));
        m.record_miss();
        m.record_compute(Duration::from_millis(40));

        let snap = m.snapshot();
        assert_eq!(snap.hits, 2);
        assert!((snap.avg_hit_latency_ms - 2.0).abs() < 1e-9);
        assert!((snap.avg_compute_ms - 40.0).abs() < 1e-9);
        assert!((snap.speedup - 20.0).abs() < 1e-9);
        assert!((snap.hit_rate() - 2.0 / 3.0).abs() < 1e-12);
    }
}
