//! Metrics hooks for the cached read path and invalidation.
//!
//! Implement `CacheMetrics` to feed your monitoring system:
//!
//! ```ignore
//! use compliance_cache::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, duration: Duration) {
//!         // histogram!("cache_hit_seconds").record(duration.as_secs_f64());
//!     }
//! }
//!
//! // let reads = CachedReadRepository::new(backend).with_metrics(PrometheusMetrics);
//! ```
//!
//! The provided methods log through the `log` crate; `NoOpMetrics` records
//! nothing and is the default.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub trait CacheMetrics: Send + Sync {
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    fn record_set(&self, key: &str, duration: Duration) {
        debug!("Cache SET: {} took {:?}", key, duration);
    }

    /// Pattern removal and the number of keys it removed.
    fn record_invalidation(&self, pattern: &str, removed: u64) {
        debug!("Cache INVALIDATE: {} removed {}", pattern, removed);
    }

    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str, _duration: Duration) {}
    fn record_invalidation(&self, _pattern: &str, _removed: u64) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// In-process counters. Handy in tests and for a quick `/stats` endpoint.
#[derive(Default)]
pub struct CountingMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    invalidated: AtomicU64,
    errors: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub invalidated: u64,
    pub errors: u64,
}

impl CountingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

impl CacheMetrics for CountingMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self, _key: &str, _duration: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_set(&self, _key: &str, _duration: Duration) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    fn record_invalidation(&self, _pattern: &str, removed: u64) {
        self.invalidated.fetch_add(removed, Ordering::Relaxed);
    }

    fn record_error(&self, _key: &str, _error: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

impl<M: CacheMetrics + ?Sized> CacheMetrics for std::sync::Arc<M> {
    fn record_hit(&self, key: &str, duration: Duration) {
        (**self).record_hit(key, duration)
    }

    fn record_miss(&self, key: &str, duration: Duration) {
        (**self).record_miss(key, duration)
    }

    fn record_set(&self, key: &str, duration: Duration) {
        (**self).record_set(key, duration)
    }

    fn record_invalidation(&self, pattern: &str, removed: u64) {
        (**self).record_invalidation(pattern, removed)
    }

    fn record_error(&self, key: &str, error: &str) {
        (**self).record_error(key, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_noop_metrics() {
        let metrics = NoOpMetrics;
        metrics.record_hit("key", Duration::from_secs(1));
        metrics.record_invalidation("key*", 3);
    }

    #[test]
    fn test_counting_metrics_through_arc() {
        let metrics = Arc::new(CountingMetrics::new());
        let shared = Arc::clone(&metrics);

        shared.record_hit("a", Duration::ZERO);
        shared.record_miss("b", Duration::ZERO);
        shared.record_set("b", Duration::ZERO);
        shared.record_invalidation("b*", 4);
        shared.record_error("c", "boom");

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                hits: 1,
                misses: 1,
                sets: 1,
                invalidated: 4,
                errors: 1,
            }
        );
    }
}
