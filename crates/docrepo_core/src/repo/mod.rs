//! Repository layer over a [`StorageBackend`](crate::backend::StorageBackend).
//!
//! # Responsibility
//! - Translate typed entity and key-value calls into backend commands.
//! - Own soft-delete, restore and replace-merge semantics.
//!
//! # Invariants
//! - Repositories hold nothing but a backend handle and fixed options, so one
//!   instance can serve concurrent callers.
//! - Id-addressed mutations of missing entities fail with `EntityNotFound`;
//!   hard deletes never fail on zero matches.

pub mod entity_repo;
pub mod kv_repo;
