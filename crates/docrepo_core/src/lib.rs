//! Typed document repository with soft delete and a key-value overlay.
//!
//! Entities are stored one collection per type; [`Repository`] owns their
//! lifecycle metadata and [`KeyValueStore`] keeps loose settings-like values
//! in the shared `Keys` collection. Both run on any [`StorageBackend`]; the
//! crate ships an embedded SQLite one.

pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;

pub use backend::{
    DocumentCollection, FindOptions, SortOrder, SqliteBackend, StorageBackend, WriteOutcome,
};
pub use config::{DatabaseLocation, StoreSettings};
pub use db::{DbError, DbResult};
pub use error::{StoreError, StoreResult};
pub use filter::{CompareOp, Field, Filter};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::entity::{is_none_or_deleted, Entity, EntityId, EntityMeta};
pub use model::key_value::KeyValueRecord;
pub use query::Query;
pub use repo::entity_repo::Repository;
pub use repo::kv_repo::KeyValueStore;

/// Returns the crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
