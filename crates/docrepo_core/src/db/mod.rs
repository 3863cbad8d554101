//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the embedded document store.
//! - Apply schema migrations in deterministic order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Documents must not be read or written before migrations succeed.

use thiserror::Error;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Storage-layer failure. Surfaced to callers as `StoreError::Storage`.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid collection name `{0}`")]
    InvalidCollectionName(String),

    #[error("invalid field path `{0}`")]
    InvalidFieldPath(String),

    #[error("invalid stored document in `{collection}`: {message}")]
    InvalidData { collection: String, message: String },

    #[error("`{operation}` on `{collection}` was not acknowledged")]
    Unacknowledged {
        operation: &'static str,
        collection: String,
    },

    /// The blocking worker running a statement panicked or was cancelled.
    #[error("storage worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
