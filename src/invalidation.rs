//! Pattern-based cache invalidation after writes.

use crate::backend::CacheBackend;
use crate::entity::Entity;
use crate::error::Result;
use crate::key::InvalidationPatterns;
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::tenant::TenantId;
use futures::future::try_join_all;

/// Removes every cached view that a mutation of one entity can make stale.
///
/// Patterns come from `InvalidationPatterns`, which uses the same key builder
/// as the read path. Removing keys that do not exist is a no-op, so
/// invalidating twice is the same as invalidating once.
#[derive(Clone)]
pub struct CacheInvalidator<B: CacheBackend, M: CacheMetrics = NoOpMetrics> {
    backend: B,
    metrics: M,
}

impl<B: CacheBackend> CacheInvalidator<B> {
    pub fn new(backend: B) -> Self {
        CacheInvalidator {
            backend,
            metrics: NoOpMetrics,
        }
    }
}

impl<B: CacheBackend, M: CacheMetrics> CacheInvalidator<B, M> {
    pub fn with_metrics<N: CacheMetrics>(self, metrics: N) -> CacheInvalidator<B, N> {
        CacheInvalidator {
            backend: self.backend,
            metrics,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Drop the cached views of entity `id` of type `E` in `tenant`.
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// The first backend failure. Removals that already went through stay
    /// applied.
    pub async fn invalidate<E: Entity>(&self, id: &E::Id, tenant: &TenantId) -> Result<u64> {
        let patterns = InvalidationPatterns::for_entity::<E>(id, tenant);
        let removed = self.remove_all(&patterns).await?;
        debug!(
            "Invalidated {} cache entries for {} {} (tenant {})",
            removed,
            E::entity_name(),
            id,
            tenant
        );
        Ok(removed)
    }

    /// Drop every cached view of `E` for `tenant`.
    pub async fn invalidate_tenant<E: Entity>(&self, tenant: &TenantId) -> Result<u64> {
        let patterns = InvalidationPatterns::for_tenant::<E>(tenant);
        let removed = self.remove_all(&patterns).await?;
        info!(
            "Invalidated {} cache entries for all {} of tenant {}",
            removed,
            E::entity_name(),
            tenant
        );
        Ok(removed)
    }

    /// Patterns are independent, so they are removed concurrently.
    async fn remove_all(&self, patterns: &[String]) -> Result<u64> {
        let removals = patterns.iter().map(|pattern| async move {
            match self.backend.remove_by_pattern(pattern).await {
                Ok(count) => {
                    self.metrics.record_invalidation(pattern, count);
                    Ok(count)
                }
                Err(e) => {
                    self.metrics.record_error(pattern, &e.to_string());
                    Err(e)
                }
            }
        });

        let counts = try_join_all(removals).await?;
        Ok(counts.into_iter().sum())
    }
}
