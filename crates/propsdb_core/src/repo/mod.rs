//! Repository layer contracts and SQLite persistence.
//!
//! # Responsibility
//! - Define the read/upsert/delete contract of the property store.
//! - Keep SQL, locking and reclamation details inside the persistence
//!   boundary.
//!
//! # Invariants
//! - Every mutation is one transaction that first locks its document.
//! - Every mutation runs orphan reclamation before commit.
//! - Repository APIs return semantic errors (`NotFound`, `VersionConflict`)
//!   in addition to DB transport errors.

mod delete;
pub mod props_repo;
mod read;
mod reaper;
mod write;

pub use reaper::ReclaimReport;
