//! Typed entity repository with soft-delete semantics.
//!
//! # Responsibility
//! - Provide CRUD and predicate queries for every [`Entity`] kind.
//! - Keep `added`/`deleted` consistent across replace, delete and restore.
//!
//! # Invariants
//! - `add` is the only place that assigns `id` and `added`.
//! - `replace` never lets caller-supplied `added`/`deleted` reach storage.
//! - Lookups by id see soft-deleted entities; predicate queries only do when
//!   `include_deleted` is set.

use crate::backend::{
    entity_collection, DocumentCollection, SqliteBackend, StorageBackend, WriteOutcome,
};
use crate::config::{StoreSettings, DEFAULT_DELETE_BATCH_SIZE};
use crate::db::DbError;
use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::model::entity::{Entity, EntityId};
use crate::query::Query;
use crate::repo::kv_repo::KeyValueStore;
use chrono::{SubsecRound, Utc};
use futures::future::join_all;
use log::{debug, warn};
use uuid::Uuid;

/// Entity repository facade.
///
/// Every method is generic over the entity kind; each kind lives in its own
/// collection named by [`Entity::collection_name`].
#[derive(Clone)]
pub struct Repository<B: StorageBackend = SqliteBackend> {
    backend: B,
    delete_batch_size: usize,
}

impl Repository<SqliteBackend> {
    /// Opens the SQLite store described by `settings`.
    ///
    /// # Errors
    /// - `Configuration` when `settings` are incomplete; nothing is opened.
    pub fn open(settings: &StoreSettings) -> StoreResult<Self> {
        let backend = SqliteBackend::open(settings)?;
        Ok(Self::new(backend).with_delete_batch_size(settings.delete_batch_size))
    }
}

impl<B: StorageBackend> Repository<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
        }
    }

    /// Sets how many soft deletes `delete_many` issues concurrently.
    pub fn with_delete_batch_size(mut self, delete_batch_size: usize) -> Self {
        self.delete_batch_size = delete_batch_size.max(1);
        self
    }

    pub fn delete_batch_size(&self) -> usize {
        self.delete_batch_size
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Key-value overlay sharing this repository's backend.
    pub fn key_values(&self) -> KeyValueStore<B> {
        KeyValueStore::new(self.backend.clone())
    }

    /// Starts a lazily evaluated query over the collection of `E`.
    ///
    /// Without `include_deleted`, soft-deleted entities are filtered out.
    pub fn query<E: Entity>(&self, include_deleted: bool) -> Query<E, B> {
        Query::new(self.backend.clone(), include_deleted)
    }

    /// Assigns a fresh id and creation time to `entity`, then inserts it.
    ///
    /// # Errors
    /// - `Storage` when the insert fails or is not acknowledged.
    pub async fn add<E: Entity>(&self, entity: &mut E) -> StoreResult<EntityId> {
        let meta = entity.meta_mut();
        meta.id = Uuid::new_v4();
        meta.added = Utc::now().trunc_subsecs(3);

        let document = serde_json::to_value(&*entity)?;
        let collection = self.collection::<E>().await?;
        let outcome = collection.insert_one(document).await?;
        if !outcome.acknowledged {
            return Err(unacknowledged("insert_one", collection.name()));
        }

        debug!(
            "event=entity_add module=repo status=ok collection={} id={}",
            collection.name(),
            entity.id()
        );
        Ok(entity.id())
    }

    pub async fn any<E: Entity>(&self, filter: Filter, include_deleted: bool) -> StoreResult<bool> {
        self.query::<E>(include_deleted).filter(filter).any().await
    }

    pub async fn count<E: Entity>(&self, filter: Filter, include_deleted: bool) -> StoreResult<u64> {
        self.query::<E>(include_deleted).filter(filter).count().await
    }

    /// Looks up one entity by id, including soft-deleted ones.
    pub async fn get<E: Entity>(&self, id: EntityId) -> StoreResult<Option<E>> {
        self.query::<E>(true).filter(Filter::by_id(id)).first().await
    }

    /// First match of `filter`, or `None`. No ordering is guaranteed.
    pub async fn first<E: Entity>(
        &self,
        filter: Filter,
        include_deleted: bool,
    ) -> StoreResult<Option<E>> {
        self.query::<E>(include_deleted).filter(filter).first().await
    }

    /// The only match of `filter`, or `None`.
    ///
    /// # Errors
    /// - `MultipleMatches` when more than one entity matches.
    pub async fn single<E: Entity>(
        &self,
        filter: Filter,
        include_deleted: bool,
    ) -> StoreResult<Option<E>> {
        self.query::<E>(include_deleted).filter(filter).single().await
    }

    /// Every match of `filter`; pass [`Filter::All`] for the whole collection.
    pub async fn find<E: Entity>(&self, filter: Filter, include_deleted: bool) -> StoreResult<Vec<E>> {
        self.query::<E>(include_deleted).filter(filter).to_vec().await
    }

    /// Replaces the stored entity with `entity`, keeping stored metadata.
    ///
    /// A nil id makes this an [`add`](Self::add). Otherwise `entity.added` and
    /// `entity.deleted` are overwritten with the stored values before the
    /// whole document is replaced. Returns the backend acknowledgment.
    ///
    /// # Errors
    /// - `EntityNotFound` when no entity with `entity.id()` exists.
    pub async fn replace<E: Entity>(&self, entity: &mut E) -> StoreResult<bool> {
        if entity.id().is_nil() {
            self.add(entity).await?;
            return Ok(true);
        }

        let id = entity.id();
        let stored = self.require::<E>(id).await?;
        let meta = entity.meta_mut();
        meta.added = stored.added();
        meta.deleted = stored.is_deleted();

        let acknowledged = self.write_back(&*entity).await?;
        debug!(
            "event=entity_replace module=repo status=ok collection={} id={} acknowledged={}",
            E::collection_name(),
            id,
            acknowledged
        );
        Ok(acknowledged)
    }

    /// Soft-deletes the entity with `id`.
    ///
    /// # Errors
    /// - `EntityNotFound` when no entity with `id` exists.
    pub async fn delete<E: Entity>(&self, id: EntityId) -> StoreResult<bool> {
        self.set_deleted::<E>(id, true).await
    }

    /// Clears the soft-delete flag of the entity with `id`.
    ///
    /// # Errors
    /// - `EntityNotFound` when no entity with `id` exists.
    pub async fn restore<E: Entity>(&self, id: EntityId) -> StoreResult<bool> {
        self.set_deleted::<E>(id, false).await
    }

    /// Soft-deletes every entity matching `filter`, already-deleted ones included.
    ///
    /// Matches are processed in batches of [`delete_batch_size`](Self::delete_batch_size):
    /// the deletes of one batch run concurrently, the next batch starts only
    /// once the previous one has finished. Returns the number of acknowledged
    /// soft deletes.
    pub async fn delete_many<E: Entity>(&self, filter: Filter) -> StoreResult<u64> {
        let targets: Vec<EntityId> = self
            .find::<E>(filter, true)
            .await?
            .iter()
            .map(Entity::id)
            .collect();

        let mut deleted = 0;
        for batch in targets.chunks(self.delete_batch_size) {
            let results = join_all(batch.iter().map(|id| self.set_deleted::<E>(*id, true))).await;
            for result in results {
                if result? {
                    deleted += 1;
                }
            }
        }

        debug!(
            "event=entity_delete_many module=repo status=ok collection={} matched={} deleted={}",
            E::collection_name(),
            targets.len(),
            deleted
        );
        Ok(deleted)
    }

    /// Permanently removes the entity with `id`.
    ///
    /// Returns the backend acknowledgment; zero matches is not an error.
    pub async fn delete_hard<E: Entity>(&self, id: EntityId) -> StoreResult<bool> {
        let collection = self.collection::<E>().await?;
        let outcome = collection.delete_one(&Filter::by_id(id)).await?;
        debug!(
            "event=entity_delete_hard module=repo status=ok collection={} id={} removed={}",
            collection.name(),
            id,
            outcome.affected
        );
        Ok(outcome.acknowledged)
    }

    /// Permanently removes every entity matching `filter`; returns how many.
    pub async fn delete_hard_many<E: Entity>(&self, filter: Filter) -> StoreResult<u64> {
        let collection = self.collection::<E>().await?;
        let outcome = collection.delete_many(&filter).await?;
        debug!(
            "event=entity_delete_hard_many module=repo status=ok collection={} removed={}",
            collection.name(),
            outcome.affected
        );
        Ok(outcome.affected)
    }

    async fn collection<E: Entity>(&self) -> StoreResult<B::Collection> {
        Ok(entity_collection::<E, B>(&self.backend).await?)
    }

    async fn require<E: Entity>(&self, id: EntityId) -> StoreResult<E> {
        match self.get::<E>(id).await? {
            Some(entity) => Ok(entity),
            None => {
                warn!(
                    "event=entity_lookup module=repo status=error error_code=not_found collection={} id={}",
                    E::collection_name(),
                    id
                );
                Err(StoreError::EntityNotFound {
                    collection: E::collection_name().to_string(),
                    id,
                })
            }
        }
    }

    async fn set_deleted<E: Entity>(&self, id: EntityId, deleted: bool) -> StoreResult<bool> {
        let mut entity = self.require::<E>(id).await?;
        entity.meta_mut().deleted = deleted;
        let acknowledged = self.write_back(&entity).await?;
        debug!(
            "event=entity_set_deleted module=repo status=ok collection={} id={} deleted={} acknowledged={}",
            E::collection_name(),
            id,
            deleted,
            acknowledged
        );
        Ok(acknowledged)
    }

    /// Full-document replacement keyed by the entity's id.
    async fn write_back<E: Entity>(&self, entity: &E) -> StoreResult<bool> {
        let document = serde_json::to_value(entity)?;
        let collection = self.collection::<E>().await?;
        let outcome: WriteOutcome = collection
            .replace_one(&Filter::by_id(entity.id()), document)
            .await?;
        Ok(outcome.acknowledged)
    }
}

fn unacknowledged(operation: &'static str, collection: &str) -> StoreError {
    StoreError::Storage(DbError::Unacknowledged {
        operation,
        collection: collection.to_string(),
    })
}
