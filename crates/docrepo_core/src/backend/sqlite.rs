//! Embedded document store on SQLite.
//!
//! # Responsibility
//! - Store every collection as a table of JSON documents (`seq`, `body`).
//! - Run statements on tokio's blocking pool so async callers never block.
//!
//! # Invariants
//! - One connection per backend, shared by all clones behind a mutex.
//! - Collection names are plain identifiers; each collection has a unique
//!   expression index on its key field.
//! - Every statement that returns without error counts as acknowledged.

use super::sql::{extract, quote_ident, tail_clause, where_clause};
use super::{DocumentCollection, FindOptions, StorageBackend, WriteOutcome};
use crate::config::{DatabaseLocation, StoreSettings};
use crate::db::{open_db, open_db_in_memory, DbError, DbResult};
use crate::error::StoreResult;
use crate::filter::{validate_field_path, Filter};
use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

static COLLECTION_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid collection name regex"));

struct Shared {
    conn: Mutex<Connection>,
    /// `(collection, key_field)` pairs whose table and key index exist.
    ready_collections: Mutex<HashSet<(String, String)>>,
}

/// SQLite-backed [`StorageBackend`]. Cheap to clone.
#[derive(Clone)]
pub struct SqliteBackend {
    shared: Arc<Shared>,
}

impl SqliteBackend {
    /// Opens the database described by `settings`.
    ///
    /// # Errors
    /// - `Configuration` when the settings are incomplete; nothing is opened.
    /// - `Storage` when the database cannot be opened or migrated.
    pub fn open(settings: &StoreSettings) -> StoreResult<Self> {
        let conn = match settings.database_location()? {
            DatabaseLocation::Memory => open_db_in_memory()?,
            DatabaseLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(DbError::from)?;
                }
                open_db(&path)?
            }
        };
        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> DbResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps a connection returned by [`open_db`] or [`open_db_in_memory`].
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            shared: Arc::new(Shared {
                conn: Mutex::new(conn),
                ready_collections: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Runs `job` against the connection on the blocking pool.
    async fn run<T, F>(&self, job: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || {
            let conn = shared.conn.lock();
            job(&conn)
        })
        .await?
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    type Collection = SqliteCollection;

    async fn collection(&self, name: &str, key_field: &str) -> DbResult<SqliteCollection> {
        if !COLLECTION_NAME_PATTERN.is_match(name) {
            return Err(DbError::InvalidCollectionName(name.to_string()));
        }
        validate_field_path(key_field)?;

        let collection = SqliteCollection {
            backend: self.clone(),
            name: name.to_string(),
        };
        let ready_key = (name.to_string(), key_field.to_string());
        let ready = self.shared.ready_collections.lock().contains(&ready_key);
        if ready {
            return Ok(collection);
        }

        let table = quote_ident(name);
        let index = quote_ident(&format!("{name}__{}", key_field.replace('.', "_")));
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                body TEXT NOT NULL CHECK (json_valid(body))
            );
            CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} ({});",
            extract(key_field)
        );
        self.run(move |conn| Ok(conn.execute_batch(&ddl)?)).await?;

        self.shared.ready_collections.lock().insert(ready_key);
        debug!("event=collection_create module=backend status=ok collection={name} key_field={key_field}");
        Ok(collection)
    }
}

/// One collection (table) of a [`SqliteBackend`].
#[derive(Clone)]
pub struct SqliteCollection {
    backend: SqliteBackend,
    name: String,
}

impl SqliteCollection {
    fn table(&self) -> String {
        quote_ident(&self.name)
    }

    /// `WHERE seq = <first match>`: targets a single document.
    fn first_match(&self, filter: &Filter) -> DbResult<(String, Vec<SqlValue>)> {
        let fragment = where_clause(filter)?;
        let sql = format!(
            "seq = (SELECT seq FROM {} WHERE {} ORDER BY seq LIMIT 1)",
            self.table(),
            fragment.sql
        );
        Ok((sql, fragment.params))
    }

    async fn execute(&self, sql: String, params: Vec<SqlValue>) -> DbResult<u64> {
        self.backend
            .run(move |conn| {
                let changed = conn.execute(&sql, params_from_iter(params))?;
                Ok(changed as u64)
            })
            .await
    }
}

#[async_trait]
impl DocumentCollection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, document: Value) -> DbResult<WriteOutcome> {
        let sql = format!("INSERT INTO {} (body) VALUES (?)", self.table());
        let inserted = self
            .execute(sql, vec![SqlValue::Text(document.to_string())])
            .await?;
        Ok(WriteOutcome::acknowledged(inserted, inserted))
    }

    async fn replace_one(&self, filter: &Filter, document: Value) -> DbResult<WriteOutcome> {
        let (target, target_params) = self.first_match(filter)?;
        let sql = format!("UPDATE {} SET body = ? WHERE {target}", self.table());
        let mut params = vec![SqlValue::Text(document.to_string())];
        params.extend(target_params);

        let replaced = self.execute(sql, params).await?;
        Ok(WriteOutcome::acknowledged(replaced, replaced))
    }

    async fn update_one(
        &self,
        filter: &Filter,
        field: &str,
        value: Value,
    ) -> DbResult<WriteOutcome> {
        validate_field_path(field)?;
        let (target, target_params) = self.first_match(filter)?;
        let sql = format!(
            "UPDATE {} SET body = json_set(body, '$.{field}', json(?)) WHERE {target}",
            self.table()
        );
        let mut params = vec![SqlValue::Text(value.to_string())];
        params.extend(target_params);

        let updated = self.execute(sql, params).await?;
        Ok(WriteOutcome::acknowledged(updated, updated))
    }

    async fn delete_one(&self, filter: &Filter) -> DbResult<WriteOutcome> {
        let (target, params) = self.first_match(filter)?;
        let sql = format!("DELETE FROM {} WHERE {target}", self.table());
        let deleted = self.execute(sql, params).await?;
        Ok(WriteOutcome::acknowledged(deleted, deleted))
    }

    async fn delete_many(&self, filter: &Filter) -> DbResult<WriteOutcome> {
        let fragment = where_clause(filter)?;
        let sql = format!("DELETE FROM {} WHERE {}", self.table(), fragment.sql);
        let deleted = self.execute(sql, fragment.params).await?;
        Ok(WriteOutcome::acknowledged(deleted, deleted))
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> DbResult<Vec<Value>> {
        let fragment = where_clause(filter)?;
        let mut params = fragment.params;
        let tail = tail_clause(options, &mut params)?;
        let sql = format!(
            "SELECT body FROM {} WHERE {}{tail}",
            self.table(),
            fragment.sql
        );
        let collection = self.name.clone();

        self.backend
            .run(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params_from_iter(params))?;
                let mut documents = Vec::new();
                while let Some(row) = rows.next()? {
                    let body: String = row.get(0)?;
                    let document = serde_json::from_str(&body).map_err(|err| {
                        DbError::InvalidData {
                            collection: collection.clone(),
                            message: err.to_string(),
                        }
                    })?;
                    documents.push(document);
                }
                Ok(documents)
            })
            .await
    }

    async fn count(&self, filter: &Filter) -> DbResult<u64> {
        let fragment = where_clause(filter)?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            self.table(),
            fragment.sql
        );
        self.backend
            .run(move |conn| {
                let count: i64 =
                    conn.query_row(&sql, params_from_iter(fragment.params), |row| row.get(0))?;
                Ok(u64::try_from(count).unwrap_or_default())
            })
            .await
    }

    async fn exists(&self, filter: &Filter) -> DbResult<bool> {
        let fragment = where_clause(filter)?;
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {})",
            self.table(),
            fragment.sql
        );
        self.backend
            .run(move |conn| {
                let exists: bool =
                    conn.query_row(&sql, params_from_iter(fragment.params), |row| row.get(0))?;
                Ok(exists)
            })
            .await
    }
}
