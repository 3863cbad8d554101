//! Stored shape of the key-value overlay.

use serde::{Deserialize, Serialize};

/// Shared collection holding every key-value record.
pub const KEYS_COLLECTION: &str = "Keys";
/// Unique key field of [`KeyValueRecord`].
pub const KEY_FIELD: &str = "key";
/// Field holding the JSON text of the stored value.
pub const VALUE_FIELD: &str = "value";

/// One key-value pair. `value` is the JSON text of the caller's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueRecord {
    pub key: String,
    pub value: String,
}
