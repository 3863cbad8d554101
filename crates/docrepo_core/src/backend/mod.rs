//! Storage backend capability consumed by the repository facade.
//!
//! # Responsibility
//! - Define the minimal document-collection operations the facade needs.
//! - Keep query translation and I/O details inside backend implementations.
//!
//! # Invariants
//! - Collection naming is deterministic: the same name always resolves to the
//!   same collection.
//! - Every mutating call reports whether the backend acknowledged the write;
//!   callers decide what an unacknowledged write means.

use crate::db::{DbError, DbResult};
use crate::filter::Filter;
use crate::model::entity::{Entity, ID_FIELD};
use crate::model::key_value::KEYS_COLLECTION;
use async_trait::async_trait;
use serde_json::Value;

pub mod sqlite;
mod sql;

pub use sqlite::{SqliteBackend, SqliteCollection};

/// Result of a mutating collection call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// The backend confirmed the write was applied.
    pub acknowledged: bool,
    /// Documents selected by the filter (or inserted).
    pub matched: u64,
    /// Documents actually written or removed.
    pub affected: u64,
}

impl WriteOutcome {
    pub fn acknowledged(matched: u64, affected: u64) -> Self {
        Self {
            acknowledged: true,
            matched,
            affected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Ordering and paging for [`DocumentCollection::find`].
///
/// Without an explicit sort, backends return documents in an unspecified but
/// stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub sort: Vec<(String, SortOrder)>,
    pub skip: u64,
    pub limit: Option<u64>,
}

/// Handle to a backing document database.
#[async_trait]
pub trait StorageBackend: Clone + Send + Sync + 'static {
    type Collection: DocumentCollection;

    /// Resolves the collection `name`, creating it on first use with a unique
    /// index on `key_field`.
    async fn collection(&self, name: &str, key_field: &str) -> DbResult<Self::Collection>;
}

/// Operations on one collection of JSON documents.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    fn name(&self) -> &str;

    async fn insert_one(&self, document: Value) -> DbResult<WriteOutcome>;

    /// Replaces the whole of the first document matching `filter`.
    async fn replace_one(&self, filter: &Filter, document: Value) -> DbResult<WriteOutcome>;

    /// Sets one field of the first document matching `filter`.
    async fn update_one(&self, filter: &Filter, field: &str, value: Value)
        -> DbResult<WriteOutcome>;

    async fn delete_one(&self, filter: &Filter) -> DbResult<WriteOutcome>;

    async fn delete_many(&self, filter: &Filter) -> DbResult<WriteOutcome>;

    async fn find(&self, filter: &Filter, options: &FindOptions) -> DbResult<Vec<Value>>;

    async fn count(&self, filter: &Filter) -> DbResult<u64>;

    async fn exists(&self, filter: &Filter) -> DbResult<bool>;
}

/// Resolves the collection holding entities of kind `E`.
///
/// The key-value collection is reserved and never resolves as an entity
/// collection.
pub(crate) async fn entity_collection<E: Entity, B: StorageBackend>(
    backend: &B,
) -> DbResult<B::Collection> {
    let name = E::collection_name();
    if name == KEYS_COLLECTION {
        return Err(DbError::InvalidCollectionName(name.to_string()));
    }
    backend.collection(name, ID_FIELD).await
}
