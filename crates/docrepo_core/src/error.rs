//! Error taxonomy for repository and key-value operations.

use crate::db::DbError;
use crate::model::entity::EntityId;
use thiserror::Error;

/// Result type for repository and key-value operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by [`Repository`](crate::Repository) and
/// [`KeyValueStore`](crate::KeyValueStore).
///
/// Backend failures are passed through unchanged as [`StoreError::Storage`];
/// only not-found and multi-match conditions are translated.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Settings are missing or invalid. Raised before storage is touched.
    #[error("invalid store configuration: {0}")]
    Configuration(String),

    /// An id-addressed mutation targeted an entity that does not exist.
    #[error("entity of type {collection} with id {id} was not found")]
    EntityNotFound { collection: String, id: EntityId },

    /// A single-result lookup matched more than one entity.
    #[error("more than one {collection} entity matched a single-result query")]
    MultipleMatches { collection: String },

    #[error("storage failure: {0}")]
    Storage(#[from] DbError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(DbError::Sqlite(value))
    }
}

impl StoreError {
    /// Returns true for the not-found condition of id-addressed mutations.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EntityNotFound { .. })
    }
}
