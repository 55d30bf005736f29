//! Relational storage bootstrap, pooling and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the property store.
//! - Apply schema migrations in deterministic order.
//! - Hand out bounded, per-scope connection pools.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write property data before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod dialect;
pub mod migrations;
mod open;
mod pool;

pub use dialect::Dialect;
pub use open::{open_db, open_db_in_memory};
pub use pool::{ConnectionPool, PoolSettings, PooledConnection};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The configured dialect family has no engine adapter in this build.
    UnsupportedDialect(Dialect),
    /// No pooled connection became available in time.
    PoolTimeout {
        pool: &'static str,
        waited_ms: u128,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::UnsupportedDialect(dialect) => {
                write!(f, "no engine adapter for dialect `{}`", dialect.name())
            }
            Self::PoolTimeout { pool, waited_ms } => write!(
                f,
                "no connection available in `{pool}` pool after {waited_ms}ms"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::UnsupportedDialect(_) => None,
            Self::PoolTimeout { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
