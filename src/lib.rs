//! # compliance-cache
//!
//! Cache and search consistency for a multi-tenant compliance store.
//!
//! The primary store (SQL, or anything implementing [`PrimaryRepository`]) is
//! the single source of truth. This crate keeps two derived copies in step
//! with it:
//!
//! - a **query-result cache**, keyed by specification, tenant, operation and
//!   DTO, read through by [`CachedReadRepository`] and cleared by
//!   [`CacheInvalidator`] whenever [`EntityWriteWorkflow`] writes;
//! - a **search index**, fed by [`SearchIndexClient`] with every engine call
//!   wrapped in a single injected [`RetryPolicy`].
//!
//! ## Write then read
//!
//! ```
//! # use chrono::{DateTime, Utc};
//! # use compliance_cache::{Entity, TenantId};
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Clone, Serialize, Deserialize)]
//! # pub struct Merchant { id: u64, tenant_id: TenantId, name: String }
//! # impl Entity for Merchant {
//! #     type Id = u64;
//! #     type Dto = Merchant;
//! #     fn id(&self) -> u64 { self.id }
//! #     fn tenant_id(&self) -> &TenantId { &self.tenant_id }
//! #     fn last_modified(&self) -> DateTime<Utc> { DateTime::<Utc>::default() }
//! #     fn entity_name() -> &'static str { "Merchant" }
//! #     fn to_dto(&self) -> Merchant { self.clone() }
//! # }
//! use compliance_cache::backend::InMemoryBackend;
//! use compliance_cache::specification::ById;
//! use compliance_cache::tenant::FixedTenant;
//! use compliance_cache::{
//!     CacheInvalidator, CachedReadRepository, EntityWriteWorkflow, InMemoryRepository,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let cache = InMemoryBackend::new();
//! let writes = EntityWriteWorkflow::new(
//!     InMemoryRepository::<Merchant>::new(),
//!     CacheInvalidator::new(cache.clone()),
//!     FixedTenant::new("acme"),
//! );
//! let reads = CachedReadRepository::new(cache.clone());
//!
//! let tenant = TenantId::new("acme");
//! writes
//!     .create(Merchant { id: 1, tenant_id: tenant.clone(), name: "Initial".into() })
//!     .await?;
//!
//! let spec = ById::<Merchant>::new(1, tenant.clone());
//! let merchant = reads.first_or_default(&spec, writes.repository()).await?;
//! assert_eq!(merchant.map(|m| m.name), Some("Initial".to_string()));
//!
//! writes
//!     .update(Merchant { id: 1, tenant_id: tenant.clone(), name: "Renamed".into() })
//!     .await?;
//! let merchant = reads.first_or_default(&spec, writes.repository()).await?;
//! assert_eq!(merchant.map(|m| m.name), Some("Renamed".to_string()));
//! # Ok::<_, compliance_cache::Error>(())
//! # }).unwrap();
//! ```
//!
//! ## Features
//!
//! - `inmemory` (default): DashMap-backed cache backend.
//! - `redis`: pooled Redis backend with `SCAN`-based pattern removal.
//! - `opensearch`: OpenSearch transport for [`SearchIndexClient`].

#[macro_use]
extern crate log;

pub mod backend;
pub mod entity;
pub mod error;
pub mod invalidation;
pub mod key;
pub mod lookup;
pub mod observability;
pub mod read;
pub mod repository;
pub mod retry;
pub mod search;
pub mod serialization;
pub mod specification;
pub mod strategy;
pub mod tenant;
pub mod workflow;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use entity::{Entity, IndexDocument, Indexable};
pub use error::{Error, Result};
pub use invalidation::CacheInvalidator;
pub use key::{CacheKey, InvalidationPatterns, ReadOperation};
pub use lookup::Lookup;
pub use read::{CachedReadRepository, PagedResult};
pub use repository::{InMemoryRepository, PrimaryRepository};
pub use retry::RetryPolicy;
pub use search::{SearchConfig, SearchIndexClient, SearchTransport};
pub use specification::Specification;
pub use strategy::CacheStrategy;
pub use tenant::{TenantId, TenantResolver};
pub use workflow::{EntityWriteWorkflow, SearchSync, WriteStage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
