//! Cache-backed read path.
//!
//! Every read derives its key from the specification, looks it up in the cache
//! backend and, on a miss, runs the specification against the primary store
//! and stores the result with no TTL. The cache is an accelerator: a backend
//! that fails on read or write degrades to primary-store reads and never fails
//! the call.

use crate::backend::CacheBackend;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::key::{CacheKey, ReadOperation};
use crate::lookup::Lookup;
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::repository::PrimaryRepository;
use crate::serialization::{decode_entry, encode_entry};
use crate::specification::{Paging, Specification};
use crate::strategy::CacheStrategy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Instant;

/// One page of a list plus the metadata needed to render paging controls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page_number: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total_count: u64, page_number: u32, page_size: u32) -> Self {
        PagedResult {
            items,
            total_count,
            page_number,
            page_size,
            total_pages: total_pages(total_count, page_size),
        }
    }

    pub fn has_next(&self) -> bool {
        (self.page_number as u64) < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page_number > 1
    }
}

/// `ceil(total / page_size)`; zero when the page size is zero.
pub fn total_pages(total_count: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total_count.div_ceil(page_size as u64)
}

/// Read repository that serves specifications from a cache backend.
///
/// ```
/// use compliance_cache::backend::InMemoryBackend;
/// use compliance_cache::read::CachedReadRepository;
///
/// let reads = CachedReadRepository::new(InMemoryBackend::new());
/// ```
pub struct CachedReadRepository<B: CacheBackend, M: CacheMetrics = NoOpMetrics> {
    backend: B,
    metrics: M,
}

impl<B: CacheBackend> CachedReadRepository<B> {
    pub fn new(backend: B) -> Self {
        CachedReadRepository {
            backend,
            metrics: NoOpMetrics,
        }
    }
}

impl<B: CacheBackend, M: CacheMetrics> CachedReadRepository<B, M> {
    pub fn with_metrics<N: CacheMetrics>(self, metrics: N) -> CachedReadRepository<B, N> {
        CachedReadRepository {
            backend: self.backend,
            metrics,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// First entity matching `spec`, as its DTO.
    pub async fn first_or_default<E, S, R>(&self, spec: &S, source: &R) -> Result<Option<E::Dto>>
    where
        E: Entity,
        S: Specification<E>,
        R: PrimaryRepository<E>,
    {
        self.first_or_default_with_strategy::<E, S, R>(spec, source, CacheStrategy::Refresh)
            .await
    }

    pub async fn first_or_default_with_strategy<E, S, R>(
        &self,
        spec: &S,
        source: &R,
        strategy: CacheStrategy,
    ) -> Result<Option<E::Dto>>
    where
        E: Entity,
        S: Specification<E>,
        R: PrimaryRepository<E>,
    {
        let key = spec.cache_key(ReadOperation::FirstOrDefault);
        self.read_through(&key, strategy, move || async move {
            let found = source.first_or_default(spec).await?;
            Ok::<_, Error>(found.map(|e| e.to_dto()))
        })
        .await
    }

    /// Tagged form of `first_or_default`. A failing primary store becomes
    /// `Lookup::Error` instead of an `Err`.
    pub async fn find<E, S, R>(&self, spec: &S, source: &R) -> Lookup<E::Dto>
    where
        E: Entity,
        S: Specification<E>,
        R: PrimaryRepository<E>,
    {
        self.first_or_default::<E, S, R>(spec, source).await.into()
    }

    /// Every entity matching `spec`, honouring its paging.
    pub async fn list<E, S, R>(&self, spec: &S, source: &R) -> Result<Vec<E::Dto>>
    where
        E: Entity,
        S: Specification<E>,
        R: PrimaryRepository<E>,
    {
        self.list_with_strategy::<E, S, R>(spec, source, CacheStrategy::Refresh)
            .await
    }

    pub async fn list_with_strategy<E, S, R>(
        &self,
        spec: &S,
        source: &R,
        strategy: CacheStrategy,
    ) -> Result<Vec<E::Dto>>
    where
        E: Entity,
        S: Specification<E>,
        R: PrimaryRepository<E>,
    {
        let key = spec.cache_key(ReadOperation::List);
        let items = self
            .read_through(&key, strategy, move || async move {
                let rows = source.list(spec).await?;
                let items: Vec<E::Dto> = rows.iter().map(|e| e.to_dto()).collect();
                Ok::<_, Error>(Some(items))
            })
            .await?;
        items.ok_or(Error::CacheMiss)
    }

    /// One page of `spec` with total count and page metadata.
    ///
    /// # Errors
    ///
    /// `Error::ValidationError` when `page_number` or `page_size` is zero.
    pub async fn get_paged_result<E, S, R>(
        &self,
        spec: &S,
        source: &R,
        page_number: u32,
        page_size: u32,
    ) -> Result<PagedResult<E::Dto>>
    where
        E: Entity,
        S: Specification<E>,
        R: PrimaryRepository<E>,
    {
        self.get_paged_result_with_strategy::<E, S, R>(
            spec,
            source,
            page_number,
            page_size,
            CacheStrategy::Refresh,
        )
        .await
    }

    pub async fn get_paged_result_with_strategy<E, S, R>(
        &self,
        spec: &S,
        source: &R,
        page_number: u32,
        page_size: u32,
        strategy: CacheStrategy,
    ) -> Result<PagedResult<E::Dto>>
    where
        E: Entity,
        S: Specification<E>,
        R: PrimaryRepository<E>,
    {
        if page_number == 0 || page_size == 0 {
            return Err(Error::ValidationError(format!(
                "page number and page size must be positive (got {} / {})",
                page_number, page_size
            )));
        }

        let paging = Paging::new(page_number, page_size);
        let key = spec
            .cache_key(ReadOperation::Paged)
            .segment(page_number)
            .segment(page_size);

        let page = self
            .read_through(&key, strategy, move || async move {
                let total = source.count(spec).await?;
                let rows = source.page(spec, paging.skip(), paging.take()).await?;
                let items: Vec<E::Dto> = rows.iter().map(|e| e.to_dto()).collect();
                Ok::<_, Error>(Some(PagedResult::new(
                    items,
                    total,
                    page_number,
                    page_size,
                )))
            })
            .await?;
        page.ok_or(Error::CacheMiss)
    }

    /// `Ok(None)` only when the primary store has nothing; a miss under
    /// `Fresh` is `Err(Error::CacheMiss)`.
    async fn read_through<T, F, Fut>(
        &self,
        key: &CacheKey,
        strategy: CacheStrategy,
        load: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let key = key.render();
        let timer = Instant::now();
        debug!("Cached read {} (strategy: {})", key, strategy);

        if strategy == CacheStrategy::Invalidate {
            if let Err(e) = self.backend.delete(&key).await {
                warn!("Failed to delete {} before reload: {}", key, e);
                self.metrics.record_error(&key, &e.to_string());
            }
        }

        if strategy.reads_cache() {
            if let Some(value) = self.lookup::<T>(&key).await {
                self.metrics.record_hit(&key, timer.elapsed());
                return Ok(Some(value));
            }
            self.metrics.record_miss(&key, timer.elapsed());
        }

        if !strategy.loads_primary() {
            return Err(Error::CacheMiss);
        }

        let loaded = load().await?;
        if let Some(value) = &loaded {
            self.populate(&key, value).await;
        }
        Ok(loaded)
    }

    /// Cached value under `key`, or `None` on a miss, an unreadable entry or
    /// an unavailable backend.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read failed for {}, using primary store: {}", key, e);
                self.metrics.record_error(key, &e.to_string());
                return None;
            }
        };

        match decode_entry::<T>(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Evicting unreadable cache entry {}: {}", key, e);
                self.metrics.record_error(key, &e.to_string());
                if let Err(e) = self.backend.delete(key).await {
                    warn!("Failed to evict {}: {}", key, e);
                }
                None
            }
        }
    }

    async fn populate<T: Serialize>(&self, key: &str, value: &T) {
        let timer = Instant::now();
        let result = match encode_entry(value) {
            Ok(bytes) => self.backend.set(key, bytes, None).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => self.metrics.record_set(key, timer.elapsed()),
            Err(e) => {
                warn!("Failed to populate cache entry {}: {}", key, e);
                self.metrics.record_error(key, &e.to_string());
            }
        }
    }
}

impl<B: CacheBackend, M: CacheMetrics + Clone> Clone for CachedReadRepository<B, M> {
    fn clone(&self) -> Self {
        CachedReadRepository {
            backend: self.backend.clone(),
            metrics: self.metrics.clone(),
        }
    }
}
