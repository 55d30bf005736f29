//! Data partitions and their physical table sets.
//!
//! # Invariants
//! - The shared and owner partitions never share a table.
//! - Every owner-scoped statement binds `owner_id`; an owner never sees
//!   another owner's rows.

use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identity of a data owner, as issued by the authorization service.
pub type OwnerId = Uuid;

/// Partition a request operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Application-wide data.
    Shared,
    /// Data isolated to one owner.
    Owner(OwnerId),
}

impl Scope {
    pub fn tables(&self) -> &'static ScopeTables {
        match self {
            Self::Shared => &SHARED_TABLES,
            Self::Owner(_) => &OWNER_TABLES,
        }
    }

    pub fn owner(&self) -> Option<OwnerId> {
        match self {
            Self::Shared => None,
            Self::Owner(owner) => Some(*owner),
        }
    }

    /// Short label for logs; never includes the owner id.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Owner(_) => "owner",
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared => f.write_str("shared"),
            Self::Owner(owner) => write!(f, "owner:{owner}"),
        }
    }
}

/// Physical table names for one partition.
#[derive(Debug, PartialEq, Eq)]
pub struct ScopeTables {
    pub documents: &'static str,
    pub groups: &'static str,
    pub leaves: &'static str,
    pub document_groups: &'static str,
    pub group_leaves: &'static str,
    /// Documents and groups carry an `owner_id` column.
    pub owner_scoped: bool,
}

pub const SHARED_TABLES: ScopeTables = ScopeTables {
    documents: "shared_documents",
    groups: "shared_groups",
    leaves: "shared_leaves",
    document_groups: "shared_document_groups",
    group_leaves: "shared_group_leaves",
    owner_scoped: false,
};

pub const OWNER_TABLES: ScopeTables = ScopeTables {
    documents: "owner_documents",
    groups: "owner_groups",
    leaves: "owner_leaves",
    document_groups: "owner_document_groups",
    group_leaves: "owner_group_leaves",
    owner_scoped: true,
};
