//! Entity contracts shared by the read path, the write path and the indexer.

use crate::tenant::TenantId;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::hash::Hash;

/// A domain record owned by the primary store (Merchant, Asset, Evidence, ...).
///
/// The cache and the search index only ever hold derived copies. The id is
/// supplied explicitly by each type; nothing is discovered by naming
/// convention at runtime.
///
/// # Example
///
/// ```
/// use chrono::{DateTime, Utc};
/// use compliance_cache::{Entity, TenantId};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct Merchant {
///     pub merchant_id: u64,
///     pub tenant_id: TenantId,
///     pub name: String,
///     pub updated_at: DateTime<Utc>,
/// }
///
/// impl Entity for Merchant {
///     type Id = u64;
///     type Dto = Merchant;
///
///     fn id(&self) -> u64 { self.merchant_id }
///     fn tenant_id(&self) -> &TenantId { &self.tenant_id }
///     fn last_modified(&self) -> DateTime<Utc> { self.updated_at }
///     fn entity_name() -> &'static str { "Merchant" }
///     fn to_dto(&self) -> Merchant { self.clone() }
/// }
///
/// assert_eq!(Merchant::dto_name(), "MerchantEntityDto");
/// ```
pub trait Entity: Send + Sync + Clone + 'static {
    /// Type of the entity's identifier.
    type Id: Display + Clone + Send + Sync + Eq + Hash + 'static;

    /// Shape stored in the cache and returned by cached reads.
    type Dto: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    fn id(&self) -> Self::Id;

    fn tenant_id(&self) -> &TenantId;

    fn last_modified(&self) -> DateTime<Utc>;

    /// Type name used as the first part of every cache key, e.g. `"Merchant"`.
    fn entity_name() -> &'static str;

    /// DTO name, the last part of every cache key.
    fn dto_name() -> String {
        format!("{}EntityDto", Self::entity_name())
    }

    fn to_dto(&self) -> Self::Dto;

    /// Free-text match used by list specifications with a search term.
    fn matches_search(&self, term: &str) -> bool {
        let _ = term;
        true
    }
}

/// A flattened, search-engine friendly projection keyed by an explicit id.
pub trait IndexDocument: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn document_id(&self) -> String;
}

/// Entities that have a search projection.
pub trait Indexable: Entity {
    type Document: IndexDocument;

    fn to_document(&self) -> Self::Document;

    /// Document id for an entity id, used when only the id is known (delete).
    /// Must agree with `to_document().document_id()`.
    fn document_id_for(id: &Self::Id) -> String {
        id.to_string()
    }
}
