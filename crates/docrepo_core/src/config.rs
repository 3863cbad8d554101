//! Store settings supplied by the host application.
//!
//! # Responsibility
//! - Carry connection configuration (connection string + database name).
//! - Reject absent or malformed configuration before storage is touched.
//!
//! # Invariants
//! - `connection_string` and `database_name` are never blank once validated.
//! - `delete_batch_size` is at least 1.

use crate::error::{StoreError, StoreResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;

/// Batch size used by `Repository::delete_many` unless configured otherwise.
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 50;

pub const ENV_CONNECTION_STRING: &str = "DOCREPO_CONNECTION_STRING";
pub const ENV_DATABASE_NAME: &str = "DOCREPO_DATABASE_NAME";
pub const ENV_DELETE_BATCH_SIZE: &str = "DOCREPO_DELETE_BATCH_SIZE";

const MEMORY_CONNECTION_STRING: &str = ":memory:";
const SQLITE_SCHEME: &str = "sqlite://";
const DATABASE_FILE_EXTENSION: &str = "sqlite3";

static DATABASE_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").expect("database name pattern is valid")
});

/// Connection settings for a document store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreSettings {
    /// Directory holding the database (optionally `sqlite://`-prefixed) or
    /// `:memory:`.
    pub connection_string: String,
    /// Database name; the file is `<directory>/<database_name>.sqlite3`.
    pub database_name: String,
    /// Concurrent soft deletes issued per `delete_many` batch.
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
}

/// Where the SQLite backend keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    Memory,
    File(PathBuf),
}

fn default_delete_batch_size() -> usize {
    DEFAULT_DELETE_BATCH_SIZE
}

impl StoreSettings {
    pub fn new(connection_string: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            database_name: database_name.into(),
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
        }
    }

    /// Settings for a private in-memory database.
    pub fn in_memory(database_name: impl Into<String>) -> Self {
        Self::new(MEMORY_CONNECTION_STRING, database_name)
    }

    pub fn with_delete_batch_size(mut self, delete_batch_size: usize) -> Self {
        self.delete_batch_size = delete_batch_size;
        self
    }

    /// Loads settings from `DOCREPO_*` environment variables.
    ///
    /// # Errors
    /// - `Configuration` when a required variable is absent or a value is invalid.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        let require = |name: &str| {
            lookup(name).ok_or_else(|| {
                StoreError::Configuration(format!("environment variable `{name}` is not set"))
            })
        };

        let mut settings = Self::new(require(ENV_CONNECTION_STRING)?, require(ENV_DATABASE_NAME)?);
        if let Some(raw) = lookup(ENV_DELETE_BATCH_SIZE) {
            settings.delete_batch_size = raw.trim().parse().map_err(|_| {
                StoreError::Configuration(format!(
                    "`{ENV_DELETE_BATCH_SIZE}` must be a positive integer, got `{raw}`"
                ))
            })?;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Checks that every setting is present and well-formed.
    pub fn validate(&self) -> StoreResult<()> {
        if self.connection_string.trim().is_empty() {
            return Err(StoreError::Configuration(
                "connection string cannot be empty".to_string(),
            ));
        }

        let name = self.database_name.trim();
        if name.is_empty() {
            return Err(StoreError::Configuration(
                "database name cannot be empty".to_string(),
            ));
        }
        if !DATABASE_NAME_PATTERN.is_match(name) {
            return Err(StoreError::Configuration(format!(
                "database name `{name}` may only contain letters, digits, `_`, `-` and `.`"
            )));
        }

        if self.delete_batch_size == 0 {
            return Err(StoreError::Configuration(
                "delete batch size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolves the storage location described by these settings.
    pub fn database_location(&self) -> StoreResult<DatabaseLocation> {
        self.validate()?;

        let connection = self.connection_string.trim();
        if connection == MEMORY_CONNECTION_STRING {
            return Ok(DatabaseLocation::Memory);
        }

        let directory = connection.strip_prefix(SQLITE_SCHEME).unwrap_or(connection);
        let file_name = format!("{}.{DATABASE_FILE_EXTENSION}", self.database_name.trim());
        Ok(DatabaseLocation::File(PathBuf::from(directory).join(file_name)))
    }
}
