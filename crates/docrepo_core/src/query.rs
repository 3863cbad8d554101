//! Lazily evaluated, composable queries over one entity collection.
//!
//! # Invariants
//! - Building a query never touches storage; only the terminal `async`
//!   methods do.
//! - A query created without `include_deleted` always carries the
//!   `deleted == false` predicate, whatever is composed onto it later.

use crate::backend::{
    entity_collection, DocumentCollection, FindOptions, SortOrder, StorageBackend,
};
use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::model::entity::Entity;
use serde_json::Value;
use std::marker::PhantomData;

/// Query handle returned by [`Repository::query`](crate::Repository::query).
///
/// ```ignore
/// let recent = repo
///     .query::<Invoice>(false)
///     .filter(Field::new("customer").eq("acme"))
///     .order_by("added", SortOrder::Descending)
///     .limit(10)
///     .to_vec()
///     .await?;
/// ```
pub struct Query<E, B> {
    backend: B,
    filter: Filter,
    options: FindOptions,
    _entity: PhantomData<fn() -> E>,
}

impl<E, B: Clone> Clone for Query<E, B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            filter: self.filter.clone(),
            options: self.options.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity, B: StorageBackend> Query<E, B> {
    pub(crate) fn new(backend: B, include_deleted: bool) -> Self {
        let filter = if include_deleted {
            Filter::All
        } else {
            Filter::not_deleted()
        };
        Self {
            backend,
            filter,
            options: FindOptions::default(),
            _entity: PhantomData,
        }
    }

    /// Narrows the query; the new predicate is AND-ed with the existing one.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.options.sort.push((field.into(), order));
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.options.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Predicate that will be sent to the backend.
    pub fn predicate(&self) -> &Filter {
        &self.filter
    }

    pub async fn any(&self) -> StoreResult<bool> {
        if self.is_paged() {
            return Ok(self.count().await? > 0);
        }
        let collection = self.collection().await?;
        Ok(collection.exists(&self.filter).await?)
    }

    /// Number of matches, after `skip` and `limit` are applied.
    pub async fn count(&self) -> StoreResult<u64> {
        let collection = self.collection().await?;
        let total = collection.count(&self.filter).await?;
        let remaining = total.saturating_sub(self.options.skip);
        Ok(self
            .options
            .limit
            .map_or(remaining, |limit| remaining.min(limit)))
    }

    /// First match, or `None`. Ordering is unspecified unless `order_by` was used.
    pub async fn first(&self) -> StoreResult<Option<E>> {
        let documents = self.fetch(Some(1)).await?;
        documents.into_iter().next().map(decode::<E>).transpose()
    }

    /// The only match, or `None`.
    ///
    /// # Errors
    /// - `MultipleMatches` when more than one document matches.
    pub async fn single(&self) -> StoreResult<Option<E>> {
        let mut documents = self.fetch(Some(2)).await?;
        if documents.len() > 1 {
            return Err(StoreError::MultipleMatches {
                collection: E::collection_name().to_string(),
            });
        }
        documents.pop().map(decode::<E>).transpose()
    }

    /// Materializes every match.
    pub async fn to_vec(&self) -> StoreResult<Vec<E>> {
        let documents = self.fetch(None).await?;
        documents.into_iter().map(decode::<E>).collect()
    }

    fn is_paged(&self) -> bool {
        self.options.skip > 0 || self.options.limit.is_some()
    }

    async fn collection(&self) -> StoreResult<B::Collection> {
        Ok(entity_collection::<E, B>(&self.backend).await?)
    }

    async fn fetch(&self, cap: Option<u64>) -> StoreResult<Vec<Value>> {
        let mut options = self.options.clone();
        if let Some(cap) = cap {
            options.limit = Some(options.limit.map_or(cap, |limit| limit.min(cap)));
        }
        let collection = self.collection().await?;
        Ok(collection.find(&self.filter, &options).await?)
    }
}

fn decode<E: Entity>(document: Value) -> StoreResult<E> {
    Ok(serde_json::from_value(document)?)
}
