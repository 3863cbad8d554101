//! Entity capability and facade-owned metadata.
//!
//! # Responsibility
//! - Define the bound every record type must satisfy to be stored through
//!   [`Repository`](crate::Repository).
//! - Provide the embedded metadata block that carries id, creation time and
//!   soft-delete state.
//!
//! # Invariants
//! - `id` is assigned once by the facade and never reused.
//! - `added` and `deleted` are owned by the facade; values set by callers are
//!   overwritten on replace.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a stored entity. The nil UUID means "not yet stored".
pub type EntityId = Uuid;

/// Serialized name of the id field.
pub const ID_FIELD: &str = "id";
/// Serialized name of the creation timestamp field.
pub const ADDED_FIELD: &str = "added";
/// Serialized name of the soft-delete flag.
pub const DELETED_FIELD: &str = "deleted";

/// Metadata block embedded into every entity with `#[serde(flatten)]`.
///
/// `added` is persisted as epoch milliseconds so range filters compare
/// numerically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    #[serde(default)]
    pub id: EntityId,
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub added: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

/// Record type that can be stored through the repository facade.
///
/// ```ignore
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Invoice {
///     #[serde(flatten)]
///     meta: EntityMeta,
///     number: String,
/// }
///
/// impl Entity for Invoice {
///     fn meta(&self) -> &EntityMeta { &self.meta }
///     fn meta_mut(&mut self) -> &mut EntityMeta { &mut self.meta }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Collection holding this entity kind.
    ///
    /// Defaults to the short type name (`app::billing::Invoice` -> `Invoice`).
    fn collection_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    fn id(&self) -> EntityId {
        self.meta().id
    }

    fn added(&self) -> DateTime<Utc> {
        self.meta().added
    }

    fn is_deleted(&self) -> bool {
        self.meta().deleted
    }
}

/// Returns true when the entity is absent or soft-deleted.
pub fn is_none_or_deleted<E: Entity>(entity: Option<&E>) -> bool {
    entity.map_or(true, Entity::is_deleted)
}

fn short_type_name(full: &'static str) -> &'static str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}
