//! Primary store contract.
//!
//! The `PrimaryRepository` trait is the seam to the transactional store that owns
//! every entity. The cache and the search index only ever derive from it.
//!
//! Implement it over any store (SQLx, tokio-postgres, an ORM, a document store).
//! `InMemoryRepository` is provided for tests and demos: it evaluates
//! specifications in process and stages writes inside a transaction until commit.
//!
//! # Errors
//!
//! Implementations return `Err` for connectivity problems, constraint violations
//! and transaction misuse. An absent row is `Ok(None)`, never an error.

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::specification::{Paging, Specification};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Transactional store of entities of type `E`.
#[allow(async_fn_in_trait)]
pub trait PrimaryRepository<E: Entity>: Send + Sync {
    async fn get_by_id(&self, id: &E::Id) -> Result<Option<E>>;

    /// Insert a new entity. Fails if the id is already taken.
    async fn add(&self, entity: E) -> Result<E>;

    /// Replace an existing entity. Fails if the id is unknown.
    async fn update(&self, entity: E) -> Result<E>;

    /// Remove an entity. Returns whether it existed.
    async fn delete(&self, id: &E::Id) -> Result<bool>;

    async fn begin_transaction(&self) -> Result<()>;

    async fn commit_transaction(&self) -> Result<()>;

    async fn rollback_transaction(&self) -> Result<()>;

    /// First entity matching the specification, in its order.
    async fn first_or_default<S: Specification<E>>(&self, spec: &S) -> Result<Option<E>>;

    /// Every matching entity, in the specification's order and paging.
    async fn list<S: Specification<E>>(&self, spec: &S) -> Result<Vec<E>>;

    /// Number of matching entities, ignoring paging.
    async fn count<S: Specification<E>>(&self, spec: &S) -> Result<u64>;

    /// `take` matching entities after skipping `skip`.
    async fn page<S: Specification<E>>(&self, spec: &S, skip: usize, take: usize)
        -> Result<Vec<E>>;
}

/// Operation of `InMemoryRepository` that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepositoryOp {
    Read,
    Add,
    Update,
    Delete,
    Begin,
    Commit,
    Rollback,
}

enum Staged<E> {
    Upsert(E),
    Remove(String),
}

struct Row<E> {
    seq: u64,
    entity: E,
}

struct Store<E> {
    rows: HashMap<String, Row<E>>,
    next_seq: u64,
    failing: Option<RepositoryOp>,
}

impl<E: Entity> Store<E> {
    fn apply(&mut self, write: Staged<E>) {
        match write {
            Staged::Upsert(entity) => {
                let key = entity.id().to_string();
                let seq = match self.rows.get(&key) {
                    Some(row) => row.seq,
                    None => {
                        self.next_seq += 1;
                        self.next_seq
                    }
                };
                self.rows.insert(key, Row { seq, entity });
            }
            Staged::Remove(key) => {
                self.rows.remove(&key);
            }
        }
    }

    /// Whether `key` exists once the writes in `staged` are applied.
    fn visible(&self, staged: &Option<Vec<Staged<E>>>, key: &str) -> bool {
        if let Some(staged) = staged {
            for write in staged.iter().rev() {
                match write {
                    Staged::Upsert(e) if e.id().to_string() == key => return true,
                    Staged::Remove(k) if k == key => return false,
                    _ => {}
                }
            }
        }
        self.rows.contains_key(key)
    }

    fn select<S: Specification<E>>(&self, spec: &S) -> Vec<E> {
        let mut rows: Vec<&Row<E>> = self
            .rows
            .values()
            .filter(|row| spec.is_satisfied_by(&row.entity))
            .collect();
        rows.sort_by_key(|row| row.seq);
        let mut matched: Vec<E> = rows.into_iter().map(|row| row.entity.clone()).collect();
        matched.sort_by(|a, b| spec.compare(a, b));
        matched
    }
}

#[derive(Default)]
struct Counters {
    queries: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// In-memory primary store.
///
/// Reads see committed rows only. Writes outside a transaction apply at once;
/// inside one they are staged and applied in order on commit, or dropped on
/// rollback. Call counters let tests assert how often the store was queried.
///
/// A handle holds at most one open transaction. Concurrent writers each take
/// their own handle from [`InMemoryRepository::session`]; sessions share rows,
/// failure injection and counters.
pub struct InMemoryRepository<E: Entity> {
    store: Arc<Mutex<Store<E>>>,
    counters: Arc<Counters>,
    transaction: Mutex<Option<Vec<Staged<E>>>>,
}

impl<E: Entity> InMemoryRepository<E> {
    pub fn new() -> Self {
        InMemoryRepository {
            store: Arc::new(Mutex::new(Store {
                rows: HashMap::new(),
                next_seq: 0,
                failing: None,
            })),
            counters: Arc::new(Counters::default()),
            transaction: Mutex::new(None),
        }
    }

    /// Another handle over the same rows, with its own transaction slot.
    pub fn session(&self) -> Self {
        InMemoryRepository {
            store: Arc::clone(&self.store),
            counters: Arc::clone(&self.counters),
            transaction: Mutex::new(None),
        }
    }

    /// Seed a committed row without going through a transaction.
    pub fn insert(&self, entity: E) -> Result<()> {
        self.lock()?.apply(Staged::Upsert(entity));
        Ok(())
    }

    /// Make every call of `op` fail until `clear_failure` is called.
    pub fn fail_on(&self, op: RepositoryOp) -> Result<()> {
        self.lock()?.failing = Some(op);
        Ok(())
    }

    pub fn clear_failure(&self) -> Result<()> {
        self.lock()?.failing = None;
        Ok(())
    }

    /// Number of read queries served (by id or by specification).
    pub fn query_count(&self) -> usize {
        self.counters.queries.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this handle has an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.staged().map(|t| t.is_some()).unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store<E>>> {
        self.store
            .lock()
            .map_err(|_| Error::RepositoryError("repository state poisoned".to_string()))
    }

    fn staged(&self) -> Result<MutexGuard<'_, Option<Vec<Staged<E>>>>> {
        self.transaction
            .lock()
            .map_err(|_| Error::TransactionError("transaction state poisoned".to_string()))
    }

    /// Lock the store, failing if `op` has been made to fail.
    fn enter(&self, op: RepositoryOp) -> Result<MutexGuard<'_, Store<E>>> {
        let store = self.lock()?;
        if store.failing == Some(op) {
            return Err(match op {
                RepositoryOp::Begin | RepositoryOp::Commit | RepositoryOp::Rollback => {
                    Error::TransactionError(format!("{:?} failed", op))
                }
                _ => Error::RepositoryError(format!("{:?} failed", op)),
            });
        }
        if op == RepositoryOp::Read {
            self.counters.queries.fetch_add(1, Ordering::SeqCst);
        }
        Ok(store)
    }

    /// Stage `write` in the open transaction, or apply it at once.
    fn write(&self, store: &mut Store<E>, staged: &mut Option<Vec<Staged<E>>>, write: Staged<E>) {
        match staged {
            Some(staged) => staged.push(write),
            None => store.apply(write),
        }
    }
}

impl<E: Entity> Default for InMemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> PrimaryRepository<E> for InMemoryRepository<E> {
    async fn get_by_id(&self, id: &E::Id) -> Result<Option<E>> {
        let store = self.enter(RepositoryOp::Read)?;
        Ok(store.rows.get(&id.to_string()).map(|row| row.entity.clone()))
    }

    async fn add(&self, entity: E) -> Result<E> {
        let mut store = self.enter(RepositoryOp::Add)?;
        let mut staged = self.staged()?;
        let key = entity.id().to_string();
        if store.visible(&staged, &key) {
            return Err(Error::RepositoryError(format!(
                "{} {} already exists",
                E::entity_name(),
                key
            )));
        }
        self.write(&mut store, &mut staged, Staged::Upsert(entity.clone()));
        Ok(entity)
    }

    async fn update(&self, entity: E) -> Result<E> {
        let mut store = self.enter(RepositoryOp::Update)?;
        let mut staged = self.staged()?;
        let key = entity.id().to_string();
        if !store.visible(&staged, &key) {
            return Err(Error::RepositoryError(format!(
                "{} {} does not exist",
                E::entity_name(),
                key
            )));
        }
        self.write(&mut store, &mut staged, Staged::Upsert(entity.clone()));
        Ok(entity)
    }

    async fn delete(&self, id: &E::Id) -> Result<bool> {
        let mut store = self.enter(RepositoryOp::Delete)?;
        let mut staged = self.staged()?;
        let key = id.to_string();
        let existed = store.visible(&staged, &key);
        if existed {
            self.write(&mut store, &mut staged, Staged::Remove(key));
        }
        Ok(existed)
    }

    async fn begin_transaction(&self) -> Result<()> {
        let _store = self.enter(RepositoryOp::Begin)?;
        let mut staged = self.staged()?;
        if staged.is_some() {
            return Err(Error::TransactionError(
                "a transaction is already open".to_string(),
            ));
        }
        *staged = Some(Vec::new());
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut store = self.enter(RepositoryOp::Commit)?;
        let writes = self
            .staged()?
            .take()
            .ok_or_else(|| Error::TransactionError("no open transaction".to_string()))?;
        for write in writes {
            store.apply(write);
        }
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let _store = self.enter(RepositoryOp::Rollback)?;
        if let Some(writes) = self.staged()?.take() {
            debug!("Rolled back {} staged write(s)", writes.len());
        }
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn first_or_default<S: Specification<E>>(&self, spec: &S) -> Result<Option<E>> {
        let store = self.enter(RepositoryOp::Read)?;
        Ok(store.select(spec).into_iter().next())
    }

    async fn list<S: Specification<E>>(&self, spec: &S) -> Result<Vec<E>> {
        let store = self.enter(RepositoryOp::Read)?;
        let matched = store.select(spec);
        Ok(match spec.paging() {
            Some(paging) => paged(matched, paging),
            None => matched,
        })
    }

    async fn count<S: Specification<E>>(&self, spec: &S) -> Result<u64> {
        let store = self.enter(RepositoryOp::Read)?;
        Ok(store.select(spec).len() as u64)
    }

    async fn page<S: Specification<E>>(
        &self,
        spec: &S,
        skip: usize,
        take: usize,
    ) -> Result<Vec<E>> {
        let store = self.enter(RepositoryOp::Read)?;
        Ok(store.select(spec).into_iter().skip(skip).take(take).collect())
    }
}

fn paged<E>(rows: Vec<E>, paging: Paging) -> Vec<E> {
    rows.into_iter()
        .skip(paging.skip())
        .take(paging.take())
        .collect()
}
