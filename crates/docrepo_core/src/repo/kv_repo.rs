//! Key-value overlay stored in the shared `Keys` collection.
//!
//! # Invariants
//! - A key has at most one record.
//! - A record never holds a value equal to its type's default; setting the
//!   default removes the record instead.

use crate::backend::{DocumentCollection, FindOptions, SqliteBackend, StorageBackend};
use crate::config::StoreSettings;
use crate::error::{StoreError, StoreResult};
use crate::filter::{Field, Filter};
use crate::model::key_value::{KeyValueRecord, KEYS_COLLECTION, KEY_FIELD, VALUE_FIELD};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Stores serializable values under string keys.
///
/// Values round-trip through `serde_json` text; any type with a
/// `Default` works, and reading an unknown key yields that default.
#[derive(Clone)]
pub struct KeyValueStore<B: StorageBackend = SqliteBackend> {
    backend: B,
}

impl KeyValueStore<SqliteBackend> {
    /// Opens the SQLite store described by `settings`.
    pub fn open(settings: &StoreSettings) -> StoreResult<Self> {
        Ok(Self::new(SqliteBackend::open(settings)?))
    }
}

impl<B: StorageBackend> KeyValueStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Stores `value` under `key`.
    ///
    /// Setting a type's default value deletes the record, so "never set" and
    /// "set to default" read back identically.
    ///
    /// # Errors
    /// - `Serialization` when a non-default value encodes as JSON `null`
    ///   (`f64::NAN`, `Some(None)`), since it could not be read back.
    pub async fn set<T>(&self, key: &str, value: &T) -> StoreResult<()>
    where
        T: Serialize + Default + PartialEq,
    {
        let is_default = *value == T::default();
        let encoded = serde_json::to_value(value)?;
        if encoded.is_null() && !is_default {
            return Err(StoreError::Serialization(serde::ser::Error::custom(format!(
                "non-default value for key `{key}` encodes as null"
            ))));
        }
        let encoded = encoded.to_string();

        let collection = self.collection().await?;
        let by_key = key_filter(key);
        let exists = collection.exists(&by_key).await?;

        let action = match (exists, is_default) {
            (false, true) => "noop",
            (false, false) => {
                let record = KeyValueRecord {
                    key: key.to_string(),
                    value: encoded,
                };
                collection.insert_one(serde_json::to_value(record)?).await?;
                "insert"
            }
            (true, true) => {
                collection.delete_one(&by_key).await?;
                "delete"
            }
            (true, false) => {
                collection
                    .update_one(&by_key, VALUE_FIELD, Value::String(encoded))
                    .await?;
                "update"
            }
        };

        debug!("event=kv_set module=kv status=ok action={action} key_len={}", key.len());
        Ok(())
    }

    /// Reads the value under `key`, or `T::default()` when none is stored.
    ///
    /// # Errors
    /// - `Serialization` when the stored text does not decode as `T`.
    pub async fn get<T>(&self, key: &str) -> StoreResult<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.record(key).await? {
            Some(record) => Ok(serde_json::from_str(&record.value)?),
            None => Ok(T::default()),
        }
    }

    /// Raw stored record for `key`, if any.
    pub async fn record(&self, key: &str) -> StoreResult<Option<KeyValueRecord>> {
        let collection = self.collection().await?;
        let options = FindOptions {
            limit: Some(1),
            ..Default::default()
        };
        let found = collection.find(&key_filter(key), &options).await?;
        match found.into_iter().next() {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    async fn collection(&self) -> StoreResult<B::Collection> {
        Ok(self.backend.collection(KEYS_COLLECTION, KEY_FIELD).await?)
    }
}

fn key_filter(key: &str) -> Filter {
    Field::new(KEY_FIELD).eq(key)
}
