//! Read strategies for the cached read path.
//!
//! | Strategy | Cache hit | Cache miss | Use case |
//! |----------|-----------|------------|----------|
//! | **Fresh** | Return | `Error::CacheMiss` | Caller knows the view is warm |
//! | **Refresh** | Return | Primary store, populate | Default |
//! | **Invalidate** | Delete, reload | Primary store, populate | Caller knows the view is stale |
//! | **Bypass** | Ignore | Primary store, populate | Reads that must see committed data |
//!
//! ```
//! use compliance_cache::strategy::CacheStrategy;
//!
//! assert_eq!(CacheStrategy::default(), CacheStrategy::Refresh);
//! assert!(CacheStrategy::Refresh.reads_cache());
//! assert!(!CacheStrategy::Fresh.loads_primary());
//! ```

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// Cache only. A miss is `Error::CacheMiss` and never reaches the primary store.
    Fresh,

    /// Cache first, primary store on miss, then populate.
    #[default]
    Refresh,

    /// Delete the key, load from the primary store, populate.
    Invalidate,

    /// Skip the cache read, load from the primary store, populate for others.
    Bypass,
}

impl CacheStrategy {
    /// Whether the strategy looks the key up before loading.
    pub fn reads_cache(&self) -> bool {
        matches!(self, CacheStrategy::Fresh | CacheStrategy::Refresh)
    }

    /// Whether a miss falls through to the primary store.
    pub fn loads_primary(&self) -> bool {
        !matches!(self, CacheStrategy::Fresh)
    }
}

impl std::fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStrategy::Fresh => write!(f, "Fresh"),
            CacheStrategy::Refresh => write!(f, "Refresh"),
            CacheStrategy::Invalidate => write!(f, "Invalidate"),
            CacheStrategy::Bypass => write!(f, "Bypass"),
        }
    }
}
