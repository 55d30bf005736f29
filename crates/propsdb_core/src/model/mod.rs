//! Domain model for the hierarchical property store.
//!
//! # Responsibility
//! - Define the two data partitions (scopes) and their table sets.
//! - Define the nested read model folded from flat join rows.
//! - Define mutation inputs accepted from the boundary layer.
//!
//! # Invariants
//! - Documents are addressed by `(scope, name)`; groups by name within a
//!   scope; leaves by `(group, name)`.
//! - The read model never carries database ids.

pub mod input;
pub mod scope;
pub mod tree;
