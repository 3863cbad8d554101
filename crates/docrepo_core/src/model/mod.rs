//! Document shapes stored by the repository and key-value overlay.
//!
//! # Invariants
//! - Every entity carries facade-owned metadata (`id`, `added`, `deleted`).
//! - Deletion through the facade is a soft-delete flag unless a hard delete is
//!   explicitly requested.

pub mod entity;
pub mod key_value;
