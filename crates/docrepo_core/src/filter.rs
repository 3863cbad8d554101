//! Typed predicates over stored documents.
//!
//! # Responsibility
//! - Describe document predicates as data, so each backend can translate them
//!   into its native query form.
//! - Validate field paths before a backend embeds them in a query.
//!
//! # Invariants
//! - Field paths are dot-separated identifiers (`address.city`).
//! - `Filter::All` is the identity of [`Filter::and`].

use crate::db::{DbError, DbResult};
use crate::model::entity::{EntityId, DELETED_FIELD, ID_FIELD};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FIELD_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("valid field path regex")
});

/// Comparison operator of [`Filter::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Predicate over stored documents.
///
/// Build leaves with [`Field`] and combine them with [`Filter::and`],
/// [`Filter::or`] and [`Filter::negate`]:
///
/// ```ignore
/// let overdue = Field::new("status").eq("open").and(Field::new("due").lt(now_ms));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Filter {
    /// Matches every document.
    #[default]
    All,
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// Field equals one of the values. An empty list matches nothing.
    In { field: String, values: Vec<Value> },
    /// Field is present (`true`) or absent (`false`). A JSON `null` counts as present.
    Exists { field: String, exists: bool },
    /// Text field contains the substring (case-sensitive).
    Contains { field: String, needle: String },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn all() -> Self {
        Self::All
    }

    /// Matches the document whose `id` equals `id`.
    pub fn by_id(id: EntityId) -> Self {
        Field::new(ID_FIELD).eq(id.to_string())
    }

    /// Matches documents whose soft-delete flag is unset.
    pub fn not_deleted() -> Self {
        Field::new(DELETED_FIELD).eq(false)
    }

    /// Both predicates must hold. Nested conjunctions are flattened.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, other) => other,
            (this, Self::All) => this,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (this, Self::And(mut right)) => {
                right.insert(0, this);
                Self::And(right)
            }
            (this, other) => Self::And(vec![this, other]),
        }
    }

    /// Either predicate must hold.
    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Or(mut left), other) => {
                left.push(other);
                Self::Or(left)
            }
            (this, other) => Self::Or(vec![this, other]),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Checks every field path referenced by this filter.
    pub fn validate(&self) -> DbResult<()> {
        match self {
            Self::All => Ok(()),
            Self::Compare { field, .. }
            | Self::In { field, .. }
            | Self::Exists { field, .. }
            | Self::Contains { field, .. } => validate_field_path(field),
            Self::And(filters) | Self::Or(filters) => {
                filters.iter().try_for_each(Filter::validate)
            }
            Self::Not(inner) => inner.validate(),
        }
    }
}

/// Entry point for building leaf predicates on one document field.
#[derive(Debug, Clone)]
pub struct Field(String);

impl Field {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Filter {
        Filter::Compare {
            field: self.0,
            op,
            value: value.into(),
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Ne, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Gt, value)
    }

    pub fn gte(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Gte, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Lt, value)
    }

    pub fn lte(self, value: impl Into<Value>) -> Filter {
        self.compare(CompareOp::Lte, value)
    }

    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Filter {
        Filter::In {
            field: self.0,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn exists(self) -> Filter {
        Filter::Exists {
            field: self.0,
            exists: true,
        }
    }

    pub fn missing(self) -> Filter {
        Filter::Exists {
            field: self.0,
            exists: false,
        }
    }

    pub fn contains(self, needle: impl Into<String>) -> Filter {
        Filter::Contains {
            field: self.0,
            needle: needle.into(),
        }
    }
}

/// Rejects anything but dot-separated identifiers.
pub(crate) fn validate_field_path(path: &str) -> DbResult<()> {
    if FIELD_PATH_PATTERN.is_match(path) {
        Ok(())
    } else {
        Err(DbError::InvalidFieldPath(path.to_string()))
    }
}
