//! Query specifications.
//!
//! A specification encodes the filter, ordering, paging and tenant of one
//! query. The primary store evaluates it; the cache derives its key from it.

use crate::entity::Entity;
use crate::key::{by_id_spec_name, list_paged_spec_name, CacheKey, ReadOperation};
use crate::tenant::TenantId;
use std::cmp::Ordering;
use std::marker::PhantomData;

/// One page of a list query, 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Paging {
    pub page_number: u32,
    pub page_size: u32,
}

impl Paging {
    pub fn new(page_number: u32, page_size: u32) -> Self {
        Paging {
            page_number,
            page_size,
        }
    }

    /// Rows to skip before this page.
    pub fn skip(&self) -> usize {
        (self.page_number.saturating_sub(1) as usize).saturating_mul(self.page_size as usize)
    }

    pub fn take(&self) -> usize {
        self.page_size as usize
    }
}

/// A query over entities of type `E`.
pub trait Specification<E: Entity>: Send + Sync {
    /// Specification name, the first part of the cache key
    /// (`"MerchantByIdSpec"`).
    fn name(&self) -> String;

    fn tenant_id(&self) -> &TenantId;

    /// Parameters rendered into the key between the name and the search part.
    fn key_segments(&self) -> Vec<String> {
        Vec::new()
    }

    fn search_term(&self) -> Option<&str> {
        None
    }

    /// Paging applied by list reads. Paged reads take their page explicitly.
    fn paging(&self) -> Option<Paging> {
        None
    }

    /// Filter predicate. Stores that translate specifications into their own
    /// query language may ignore it; in-memory evaluation relies on it.
    fn is_satisfied_by(&self, entity: &E) -> bool;

    /// Result ordering; insertion order is kept when everything compares equal.
    fn compare(&self, a: &E, b: &E) -> Ordering {
        let _ = (a, b);
        Ordering::Equal
    }

    /// Cache key of this specification for a read shape.
    fn cache_key(&self, operation: ReadOperation) -> CacheKey {
        CacheKey::new(self.name(), self.tenant_id().clone(), operation, E::dto_name())
            .segments(self.key_segments())
            .search(self.search_term())
    }
}

/// Single entity by id within a tenant.
pub struct ById<E: Entity> {
    id: E::Id,
    tenant: TenantId,
}

impl<E: Entity> ById<E> {
    pub fn new(id: E::Id, tenant: TenantId) -> Self {
        ById { id, tenant }
    }

    pub fn id(&self) -> &E::Id {
        &self.id
    }
}

impl<E: Entity> Specification<E> for ById<E> {
    fn name(&self) -> String {
        by_id_spec_name::<E>()
    }

    fn tenant_id(&self) -> &TenantId {
        &self.tenant
    }

    fn key_segments(&self) -> Vec<String> {
        vec![self.id.to_string()]
    }

    fn is_satisfied_by(&self, entity: &E) -> bool {
        entity.id() == self.id && entity.tenant_id() == &self.tenant
    }
}

/// All entities of a tenant, optionally paged and filtered by a search term.
/// Newest modifications come first.
pub struct ListPaged<E: Entity> {
    tenant: TenantId,
    paging: Option<Paging>,
    search: Option<String>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> ListPaged<E> {
    pub fn new(tenant: TenantId) -> Self {
        ListPaged {
            tenant,
            paging: None,
            search: None,
            _entity: PhantomData,
        }
    }

    pub fn with_paging(mut self, page_number: u32, page_size: u32) -> Self {
        self.paging = Some(Paging::new(page_number, page_size));
        self
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }
}

impl<E: Entity> Specification<E> for ListPaged<E> {
    fn name(&self) -> String {
        list_paged_spec_name::<E>()
    }

    fn tenant_id(&self) -> &TenantId {
        &self.tenant
    }

    fn key_segments(&self) -> Vec<String> {
        match self.paging {
            Some(p) => vec![p.page_number.to_string(), p.page_size.to_string()],
            None => Vec::new(),
        }
    }

    fn search_term(&self) -> Option<&str> {
        self.search.as_deref()
    }

    fn paging(&self) -> Option<Paging> {
        self.paging
    }

    fn is_satisfied_by(&self, entity: &E) -> bool {
        entity.tenant_id() == &self.tenant
            && self
                .search
                .as_deref()
                .map_or(true, |term| entity.matches_search(term))
    }

    fn compare(&self, a: &E, b: &E) -> Ordering {
        b.last_modified().cmp(&a.last_modified())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Serialize, Deserialize)]
    struct Asset {
        id: u32,
        tenant_id: TenantId,
        label: String,
        updated_at: DateTime<Utc>,
    }

    impl Entity for Asset {
        type Id = u32;
        type Dto = Asset;

        fn id(&self) -> u32 {
            self.id
        }

        fn tenant_id(&self) -> &TenantId {
            &self.tenant_id
        }

        fn last_modified(&self) -> DateTime<Utc> {
            self.updated_at
        }

        fn entity_name() -> &'static str {
            "Asset"
        }

        fn to_dto(&self) -> Asset {
            self.clone()
        }

        fn matches_search(&self, term: &str) -> bool {
            self.label.contains(term)
        }
    }

    fn asset(id: u32, tenant: &str, label: &str) -> Asset {
        Asset {
            id,
            tenant_id: TenantId::new(tenant),
            label: label.to_string(),
            updated_at: Utc::now() + Duration::seconds(id as i64),
        }
    }

    #[test]
    fn test_paging_skip_take() {
        assert_eq!(Paging::new(1, 10).skip(), 0);
        assert_eq!(Paging::new(3, 10).skip(), 20);
        assert_eq!(Paging::new(0, 10).skip(), 0);
        assert_eq!(Paging::new(2, 25).take(), 25);
    }

    #[test]
    fn test_by_id_key_matches_builder() {
        let spec = ById::<Asset>::new(5, TenantId::new("t1"));
        assert_eq!(
            spec.cache_key(ReadOperation::FirstOrDefault),
            CacheKey::by_id::<Asset>(&5, &TenantId::new("t1"))
        );
    }

    #[test]
    fn test_list_page_key_matches_builder() {
        let spec = ListPaged::<Asset>::new(TenantId::new("t1")).with_paging(1, 10);
        assert_eq!(
            spec.cache_key(ReadOperation::List),
            CacheKey::list_page::<Asset>(1, 10, &TenantId::new("t1"))
        );
    }

    #[test]
    fn test_by_id_filters_on_tenant() {
        let spec = ById::<Asset>::new(1, TenantId::new("t1"));
        assert!(spec.is_satisfied_by(&asset(1, "t1", "laptop")));
        assert!(!spec.is_satisfied_by(&asset(1, "t2", "laptop")));
        assert!(!spec.is_satisfied_by(&asset(2, "t1", "laptop")));
    }

    #[test]
    fn test_list_search_and_order() {
        let spec = ListPaged::<Asset>::new(TenantId::new("t1")).with_search("lap");
        assert!(spec.is_satisfied_by(&asset(1, "t1", "laptop")));
        assert!(!spec.is_satisfied_by(&asset(1, "t1", "server")));

        let older = asset(1, "t1", "a");
        let newer = asset(2, "t1", "b");
        assert_eq!(spec.compare(&newer, &older), Ordering::Less);
    }
}
