//! Property repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Expose the six store operations over one migrated connection.
//! - Own the document lock and the version compare-and-swap shared by
//!   every mutation.
//!
//! # Invariants
//! - The document row is read under the write lock before any change.
//! - A version advance is a conditional update guarded by the version read
//!   under that lock; zero affected rows aborts with `VersionConflict`.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::input::{GroupDeletion, GroupInput};
use crate::model::scope::{Scope, ScopeTables, OWNER_TABLES, SHARED_TABLES};
use crate::model::tree::PropsTree;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for property reads and mutations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Requested document/group (or any document at all) does not exist.
    NotFound(String),
    /// Caller's expected version does not match the stored one.
    VersionConflict {
        document: String,
        expected: u64,
        /// `None` when the document is absent or the commit-time check lost.
        actual: Option<u64>,
    },
    /// A leaf value could not be encoded for storage.
    Encode(serde_json::Error),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(target) => write!(f, "not found: {target}"),
            Self::VersionConflict {
                document,
                expected,
                actual: Some(actual),
            } => write!(
                f,
                "version conflict on document `{document}`: expected {expected}, found {actual}"
            ),
            Self::VersionConflict {
                document,
                expected,
                actual: None,
            } => write!(
                f,
                "version conflict on document `{document}`: expected {expected}"
            ),
            Self::Encode(err) => write!(f, "leaf value cannot be encoded: {err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "property repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "property repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted property data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Result of an accepted mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Document version after commit (0 after a whole-document delete).
    pub new_version: u64,
    /// Rows changed by the version update, or document rows deleted.
    pub affected_rows: u64,
}

impl MutationOutcome {
    pub(crate) fn unchanged(version: u64) -> Self {
        Self {
            new_version: version,
            affected_rows: 0,
        }
    }
}

/// Repository interface for the property store protocol.
pub trait PropsRepository {
    /// Loads one `(document, group)` pair; the group may be empty.
    fn get_group(&self, scope: &Scope, document: &str, group: &str) -> RepoResult<PropsTree>;
    /// Loads the groups of one document, optionally restricted to `filter`.
    fn get_groups(&self, scope: &Scope, document: &str, filter: &[String])
        -> RepoResult<PropsTree>;
    /// Loads every document of the scope.
    fn get_all(&self, scope: &Scope) -> RepoResult<PropsTree>;
    /// Merges groups and leaves into a document, creating it at version 0.
    fn set_properties(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
        groups: &[GroupInput],
    ) -> RepoResult<MutationOutcome>;
    /// Unlinks one group from a document.
    fn delete_group(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
        group: &str,
    ) -> RepoResult<MutationOutcome>;
    /// Removes leaves (or whole groups for empty leaf lists) from a document.
    fn delete_properties(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
        groups: &[GroupDeletion],
    ) -> RepoResult<MutationOutcome>;
    /// Deletes a document and its group links.
    fn delete_document(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
    ) -> RepoResult<MutationOutcome>;
}

/// SQLite-backed property repository.
pub struct SqlitePropsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePropsRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_props_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Wraps a connection that already passed `try_new` once.
    pub(crate) fn assume_ready(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PropsRepository for SqlitePropsRepository<'_> {
    fn get_group(&self, scope: &Scope, document: &str, group: &str) -> RepoResult<PropsTree> {
        super::read::get_group(self.conn, scope, document, group)
    }

    fn get_groups(
        &self,
        scope: &Scope,
        document: &str,
        filter: &[String],
    ) -> RepoResult<PropsTree> {
        super::read::get_groups(self.conn, scope, document, filter)
    }

    fn get_all(&self, scope: &Scope) -> RepoResult<PropsTree> {
        super::read::get_all(self.conn, scope)
    }

    fn set_properties(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
        groups: &[GroupInput],
    ) -> RepoResult<MutationOutcome> {
        super::write::set_properties(self.conn, scope, document, expected_version, groups)
    }

    fn delete_group(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
        group: &str,
    ) -> RepoResult<MutationOutcome> {
        super::delete::delete_group(self.conn, scope, document, expected_version, group)
    }

    fn delete_properties(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
        groups: &[GroupDeletion],
    ) -> RepoResult<MutationOutcome> {
        super::delete::delete_properties(self.conn, scope, document, expected_version, groups)
    }

    fn delete_document(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
    ) -> RepoResult<MutationOutcome> {
        super::delete::delete_document(self.conn, scope, document, expected_version)
    }
}

/// Document row read under the transaction's write lock.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LockedDocument {
    pub document_id: i64,
    pub version: u64,
}

/// Reads the document row under the exclusive lock held by the caller's
/// transaction.
///
/// SQLite has no row locks; the caller's `IMMEDIATE` transaction already
/// holds the database write lock, so a plain select is the locking read.
pub(crate) fn lock_document(
    conn: &Connection,
    scope: &Scope,
    document: &str,
) -> RepoResult<Option<LockedDocument>> {
    let tables = scope.tables();
    let filter = if tables.owner_scoped {
        "owner_id = ?1 AND name = ?2"
    } else {
        "name = ?1"
    };
    let sql = format!(
        "SELECT document_id, version FROM {} WHERE {filter};",
        tables.documents
    );
    let row = match scope.owner() {
        Some(owner) => conn
            .query_row(&sql, params![owner.to_string(), document], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .optional()?,
        None => conn
            .query_row(&sql, params![document], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .optional()?,
    };

    row.map(|(document_id, version)| {
        Ok(LockedDocument {
            document_id,
            version: stored_version(version, scope.tables())?,
        })
    })
    .transpose()
}

/// Compares the caller's expectation with the locked state.
///
/// An absent document is only acceptable as version 0.
pub(crate) fn ensure_version(
    document: &str,
    expected: u64,
    locked: Option<LockedDocument>,
) -> RepoResult<()> {
    let actual = locked.map(|locked| locked.version);
    if actual.unwrap_or(0) == expected {
        return Ok(());
    }
    Err(RepoError::VersionConflict {
        document: document.to_string(),
        expected,
        actual,
    })
}

/// Advances the version by one, guarded by the value read under the lock.
pub(crate) fn advance_version(
    conn: &Connection,
    tables: &ScopeTables,
    document: &str,
    locked: LockedDocument,
) -> RepoResult<MutationOutcome> {
    let next = locked.version + 1;
    let changed = conn.execute(
        &format!(
            "UPDATE {}
             SET version = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE document_id = ?1
               AND version = ?2;",
            tables.documents
        ),
        params![locked.document_id, to_db_version(locked.version)?, to_db_version(next)?],
    )?;

    if changed == 0 {
        return Err(RepoError::VersionConflict {
            document: document.to_string(),
            expected: locked.version,
            actual: None,
        });
    }

    Ok(MutationOutcome {
        new_version: next,
        affected_rows: changed as u64,
    })
}

/// Binds the owner filter for owner-scoped statements.
pub(crate) fn owner_bind(scope: &Scope) -> Option<Value> {
    scope.owner().map(|owner| Value::Text(owner.to_string()))
}

pub(crate) fn query_ids(conn: &Connection, sql: &str, binds: Vec<Value>) -> RepoResult<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

fn stored_version(value: i64, tables: &ScopeTables) -> RepoResult<u64> {
    u64::try_from(value).map_err(|_| {
        RepoError::InvalidData(format!(
            "negative version `{value}` in {}.version",
            tables.documents
        ))
    })
}

pub(crate) fn to_db_version(value: u64) -> RepoResult<i64> {
    i64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("version `{value}` exceeds storage range")))
}

fn ensure_props_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for tables in [&SHARED_TABLES, &OWNER_TABLES] {
        for table in [
            tables.documents,
            tables.groups,
            tables.leaves,
            tables.document_groups,
            tables.group_leaves,
        ] {
            if !table_exists(conn, table)? {
                return Err(RepoError::MissingRequiredTable(table));
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
