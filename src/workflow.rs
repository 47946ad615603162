//! Transactional write path.
//!
//! Every mutation runs as:
//!
//! ```text
//! Begin → Mutate → Invalidate → Commit
//!           │          │          │
//!           └──────────┴──────────┴──→ Rollback (on failure)
//! ```
//!
//! Cache invalidation happens inside the transaction, so a write whose cache
//! could not be cleared is rolled back rather than committed with stale views
//! left behind. After a successful commit the entity is pushed to the search
//! index; that step is best effort and never undoes the commit.

use crate::backend::CacheBackend;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::invalidation::CacheInvalidator;
use crate::repository::PrimaryRepository;
use crate::tenant::{TenantId, TenantResolver};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

/// Stage of a write, as reported in logs and failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStage {
    Begin,
    Mutate,
    Invalidate,
    Commit,
    Rollback,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            WriteStage::Begin => "begin",
            WriteStage::Mutate => "mutate",
            WriteStage::Invalidate => "invalidate",
            WriteStage::Commit => "commit",
            WriteStage::Rollback => "rollback",
        };
        f.write_str(stage)
    }
}

/// Pushes committed entities to a search index.
#[allow(async_fn_in_trait)]
pub trait SearchSync<E: Entity>: Send + Sync {
    /// Index or re-index the entity. `Ok(false)` when the engine refused it.
    async fn upsert(&self, entity: &E) -> Result<bool>;

    async fn remove(&self, id: &E::Id) -> Result<bool>;
}

/// No search index behind this entity type.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSearchSync;

impl<E: Entity> SearchSync<E> for NoSearchSync {
    async fn upsert(&self, _entity: &E) -> Result<bool> {
        Ok(true)
    }

    async fn remove(&self, _id: &E::Id) -> Result<bool> {
        Ok(true)
    }
}

/// Create, update and delete for one entity type with cache invalidation.
///
/// The tenant used for invalidation comes from the resolver, once per write.
/// The workflow drives the transaction of its own repository handle, so
/// concurrent requests each need a workflow over their own handle (for
/// `InMemoryRepository`, one per [`session`](crate::repository::InMemoryRepository::session)).
pub struct EntityWriteWorkflow<E, R, B, T, X = NoSearchSync>
where
    E: Entity,
    B: CacheBackend,
{
    repository: R,
    invalidator: CacheInvalidator<B>,
    tenants: T,
    search: X,
    _entity: PhantomData<fn() -> E>,
}

impl<E, R, B, T> EntityWriteWorkflow<E, R, B, T, NoSearchSync>
where
    E: Entity,
    R: PrimaryRepository<E>,
    B: CacheBackend,
    T: TenantResolver,
{
    pub fn new(repository: R, invalidator: CacheInvalidator<B>, tenants: T) -> Self {
        EntityWriteWorkflow {
            repository,
            invalidator,
            tenants,
            search: NoSearchSync,
            _entity: PhantomData,
        }
    }
}

impl<E, R, B, T, X> EntityWriteWorkflow<E, R, B, T, X>
where
    E: Entity,
    R: PrimaryRepository<E>,
    B: CacheBackend,
    T: TenantResolver,
    X: SearchSync<E>,
{
    /// Push committed writes to `search` as well.
    pub fn with_search_sync<Y: SearchSync<E>>(self, search: Y) -> EntityWriteWorkflow<E, R, B, T, Y> {
        EntityWriteWorkflow {
            repository: self.repository,
            invalidator: self.invalidator,
            tenants: self.tenants,
            search,
            _entity: PhantomData,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn invalidator(&self) -> &CacheInvalidator<B> {
        &self.invalidator
    }

    pub async fn create(&self, entity: E) -> Result<E> {
        let tenant = self.resolve_tenant(&entity)?;
        let id = entity.id();
        let saved = self
            .transact("create", &id, &tenant, move || async move {
                self.repository.add(entity).await
            })
            .await?;
        self.sync_upsert(&saved).await;
        Ok(saved)
    }

    pub async fn update(&self, entity: E) -> Result<E> {
        let tenant = self.resolve_tenant(&entity)?;
        let id = entity.id();
        let saved = self
            .transact("update", &id, &tenant, move || async move {
                self.repository.update(entity).await
            })
            .await?;
        self.sync_upsert(&saved).await;
        Ok(saved)
    }

    /// Delete by id. Returns whether the entity existed; cached views are
    /// invalidated either way.
    pub async fn delete(&self, id: E::Id) -> Result<bool> {
        let tenant = self.tenants.tenant_id();
        let target = id.clone();
        let existed = self
            .transact("delete", &id, &tenant, move || async move {
                self.repository.delete(&target).await
            })
            .await?;

        if existed {
            match self.search.remove(&id).await {
                Ok(true) => debug!("Removed {} {} from search index", E::entity_name(), id),
                Ok(false) => warn!(
                    "Search index refused removal of {} {}",
                    E::entity_name(),
                    id
                ),
                Err(e) => warn!(
                    "Search removal of {} {} failed: {}",
                    E::entity_name(),
                    id,
                    e
                ),
            }
        }
        Ok(existed)
    }

    /// The resolved tenant, which must own the entity being written.
    fn resolve_tenant(&self, entity: &E) -> Result<TenantId> {
        let tenant = self.tenants.tenant_id();
        if entity.tenant_id() != &tenant {
            return Err(Error::ValidationError(format!(
                "{} {} belongs to tenant {}, not {}",
                E::entity_name(),
                entity.id(),
                entity.tenant_id(),
                tenant
            )));
        }
        Ok(tenant)
    }

    async fn transact<V, F, Fut>(
        &self,
        action: &'static str,
        id: &E::Id,
        tenant: &TenantId,
        mutate: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Err(e) = self.repository.begin_transaction().await {
            error!(
                "{} of {} {} failed at {}: {}",
                action,
                E::entity_name(),
                id,
                WriteStage::Begin,
                e
            );
            return Err(e);
        }

        match self.mutate_and_commit(id, tenant, mutate).await {
            Ok(value) => {
                info!(
                    "{} of {} {} committed (tenant {})",
                    action,
                    E::entity_name(),
                    id,
                    tenant
                );
                Ok(value)
            }
            Err((stage, e)) => {
                warn!(
                    "{} of {} {} failed at {}, rolling back: {}",
                    action,
                    E::entity_name(),
                    id,
                    stage,
                    e
                );
                if let Err(rollback) = self.repository.rollback_transaction().await {
                    error!(
                        "{} of {} {} failed at {}: {}",
                        action,
                        E::entity_name(),
                        id,
                        WriteStage::Rollback,
                        rollback
                    );
                }
                Err(e)
            }
        }
    }

    async fn mutate_and_commit<V, F, Fut>(
        &self,
        id: &E::Id,
        tenant: &TenantId,
        mutate: F,
    ) -> std::result::Result<V, (WriteStage, Error)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let value = mutate().await.map_err(|e| (WriteStage::Mutate, e))?;

        self.invalidator
            .invalidate::<E>(id, tenant)
            .await
            .map_err(|e| (WriteStage::Invalidate, e))?;

        self.repository
            .commit_transaction()
            .await
            .map_err(|e| (WriteStage::Commit, e))?;

        Ok(value)
    }

    async fn sync_upsert(&self, entity: &E) {
        match self.search.upsert(entity).await {
            Ok(true) => debug!(
                "Indexed {} {} after commit",
                E::entity_name(),
                entity.id()
            ),
            Ok(false) => warn!(
                "Search index refused {} {}; index is stale until the next reindex",
                E::entity_name(),
                entity.id()
            ),
            Err(e) => warn!(
                "Indexing {} {} failed: {}",
                E::entity_name(),
                entity.id(),
                e
            ),
        }
    }
}
