//! Cache backends.
//!
//! A backend stores opaque bytes under string keys and can delete every key
//! matching a glob pattern, which is what write-side invalidation relies on.

use crate::error::Result;
use std::time::Duration;

pub mod inmemory;
#[cfg(feature = "redis")]
pub mod redis;

pub use inmemory::{CacheStats, InMemoryBackend};
#[cfg(feature = "redis")]
pub use redis::{PoolStats, RedisBackend, RedisConfig};

/// Distributed key/value cache.
///
/// All methods take `&self`; implementations use interior mutability or an
/// external store so one handle can be cloned and shared across tasks.
#[allow(async_fn_in_trait)]
pub trait CacheBackend: Send + Sync + Clone {
    /// `Ok(None)` on a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value`. `None` TTL leaves expiry to the backend's eviction policy.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Remove one key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Remove several keys. Override for a single round trip.
    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// Remove every key matching `pattern` (`*`, `?`, `\` escapes) and return
    /// how many were removed. No match is a successful no-op.
    async fn remove_by_pattern(&self, pattern: &str) -> Result<u64>;

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Drop everything. Not every backend supports it.
    async fn clear_all(&self) -> Result<()> {
        Err(crate::error::Error::NotImplemented(
            "clear_all not implemented for this backend".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backend_exists_default() {
        let backend = InMemoryBackend::new();
        backend
            .set("key", vec![1, 2, 3], None)
            .await
            .expect("Failed to set key");
        assert!(backend.exists("key").await.expect("Failed to check exists"));
        assert!(!backend
            .exists("nonexistent")
            .await
            .expect("Failed to check exists"));
    }

    #[tokio::test]
    async fn test_default_mdelete() {
        let backend = InMemoryBackend::new();
        backend.set("a", vec![1], None).await.expect("set");
        backend.set("b", vec![2], None).await.expect("set");

        backend.mdelete(&["a", "b", "c"]).await.expect("mdelete");
        assert!(backend.is_empty().await);
    }
}
