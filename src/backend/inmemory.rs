//! In-process cache backend over a sharded `DashMap`.
//!
//! Used in tests and single-node deployments. Pattern removal scans the map,
//! which is fine at in-process sizes.

use super::CacheBackend;
use crate::error::Result;
use crate::key::glob_matches;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        CacheEntry {
            data,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }
}

/// Thread-safe in-memory backend. Clones share the same store.
///
/// ```
/// use compliance_cache::backend::{CacheBackend, InMemoryBackend};
///
/// # tokio_test_block_on(async {
/// let backend = InMemoryBackend::new();
/// backend.set("MerchantByIdSpec-1--t1-FirstOrDefaultAsync-MerchantEntityDto", b"x".to_vec(), None).await?;
/// backend.set("MerchantByIdSpec-2--t1-FirstOrDefaultAsync-MerchantEntityDto", b"y".to_vec(), None).await?;
///
/// let removed = backend.remove_by_pattern("MerchantByIdSpec-*-t1-*").await?;
/// assert_eq!(removed, 2);
/// # Ok::<(), compliance_cache::Error>(())
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.store.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Keys currently stored, sorted. Expired entries are included until
    /// they are next touched.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.store.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub async fn stats(&self) -> CacheStats {
        let total_bytes: usize = self.store.iter().map(|entry| entry.data.len()).sum();
        let expired_count = self.store.iter().filter(|entry| entry.is_expired()).count();

        CacheStats {
            total_entries: self.store.len(),
            expired_entries: expired_count,
            total_bytes,
        }
    }

    pub async fn log_stats(&self) {
        let stats = self.stats().await;
        debug!(
            "InMemory cache: {} entries ({} expired), {} bytes",
            stats.total_entries, stats.expired_entries, stats.total_bytes
        );
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                debug!("InMemory GET {} -> hit", key);
                return Ok(Some(entry.data.clone()));
            }
        }

        self.store.remove(key);
        debug!("InMemory GET {} -> miss", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.store.insert(key.to_string(), CacheEntry::new(value, ttl));
        match ttl {
            Some(d) => debug!("InMemory SET {} (ttl {:?})", key, d),
            None => debug!("InMemory SET {}", key),
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("InMemory DELETE {}", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self
            .store
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false))
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.store.remove(*key);
        }
        debug!("InMemory MDELETE {} keys", keys.len());
        Ok(())
    }

    async fn remove_by_pattern(&self, pattern: &str) -> Result<u64> {
        // collect first: removing while iterating would deadlock on the shard
        let matched: Vec<String> = self
            .store
            .iter()
            .filter(|entry| glob_matches(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0u64;
        for key in matched {
            if self.store.remove(&key).is_some() {
                removed += 1;
            }
        }

        debug!("InMemory REMOVE {} -> {} key(s)", pattern, removed);
        Ok(removed)
    }

    async fn clear_all(&self) -> Result<()> {
        self.store.clear();
        warn!("InMemory CLEAR_ALL executed");
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        for key in [
            "MerchantByIdSpec-1--t1-FirstOrDefaultAsync-MerchantEntityDto",
            "MerchantByIdSpec-2--t1-FirstOrDefaultAsync-MerchantEntityDto",
            "MerchantListPagedSpec--t1-ListAsync-MerchantEntityDto",
            "MerchantListPagedSpec-1-10--t1-ListAsync-MerchantEntityDto",
            "MerchantListPagedSpec--t2-ListAsync-MerchantEntityDto",
        ] {
            backend
                .set(key, b"v".to_vec(), None)
                .await
                .expect("Failed to set");
        }
        backend
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = InMemoryBackend::new();
        backend
            .set("key1", b"value1".to_vec(), None)
            .await
            .expect("Failed to set");
        assert_eq!(
            backend.get("key1").await.expect("Failed to get"),
            Some(b"value1".to_vec())
        );

        backend.delete("key1").await.expect("Failed to delete");
        assert_eq!(backend.get("key1").await.expect("Failed to get"), None);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let backend = InMemoryBackend::new();
        backend
            .set("key1", b"value1".to_vec(), Some(Duration::from_millis(50)))
            .await
            .expect("Failed to set");
        assert!(backend.get("key1").await.expect("Failed to get").is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(backend.get("key1").await.expect("Failed to get").is_none());
    }

    #[tokio::test]
    async fn test_remove_by_exact_pattern() {
        let backend = seeded().await;
        let removed = backend
            .remove_by_pattern("MerchantByIdSpec-1--t1-FirstOrDefaultAsync-MerchantEntityDto")
            .await
            .expect("Failed to remove");
        assert_eq!(removed, 1);
        assert_eq!(backend.len().await, 4);
    }

    #[tokio::test]
    async fn test_remove_by_wildcard_stays_in_tenant() {
        let backend = seeded().await;
        let removed = backend
            .remove_by_pattern("MerchantListPagedSpec--t1-*")
            .await
            .expect("Failed to remove");
        assert_eq!(removed, 1);
        assert!(backend
            .exists("MerchantListPagedSpec--t2-ListAsync-MerchantEntityDto")
            .await
            .expect("exists"));
        assert!(backend
            .exists("MerchantListPagedSpec-1-10--t1-ListAsync-MerchantEntityDto")
            .await
            .expect("exists"));
    }

    #[tokio::test]
    async fn test_remove_by_pattern_without_match() {
        let backend = seeded().await;
        let removed = backend
            .remove_by_pattern("AssetByIdSpec-*")
            .await
            .expect("Failed to remove");
        assert_eq!(removed, 0);
        assert_eq!(backend.len().await, 5);
    }

    #[tokio::test]
    async fn test_clear_all_and_stats() {
        let backend = seeded().await;
        let stats = backend.stats().await;
        assert_eq!(stats.total_entries, 5);
        assert_eq!(stats.expired_entries, 0);
        assert_eq!(stats.total_bytes, 5);

        backend.clear_all().await.expect("Failed to clear");
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_clones_share_store() {
        let backend = InMemoryBackend::new();
        let other = backend.clone();
        backend
            .set("key", b"value".to_vec(), None)
            .await
            .expect("Failed to set");
        assert_eq!(other.keys().await, vec!["key".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let backend = InMemoryBackend::new();
        let mut handles = vec![];

        for i in 0..10 {
            let b = backend.clone();
            handles.push(tokio::spawn(async move {
                b.set(&format!("key_{}", i), vec![i as u8], None)
                    .await
                    .expect("Failed to set");
            }));
        }

        for handle in handles {
            handle.await.expect("Task failed");
        }

        assert_eq!(backend.len().await, 10);
    }
}
