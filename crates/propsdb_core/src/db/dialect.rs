//! SQL dialect families accepted in configuration.
//!
//! Only SQLite has an engine adapter. The other families are recognized so a
//! deployment that names one fails with a clear `UnsupportedDialect` instead
//! of an unknown-value error.

use std::fmt::{Display, Formatter};

/// Relational engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
    Sqlite,
    SqlServer,
}

impl Dialect {
    /// Parses a `DB_TYPE` value. Accepts the aliases used by deployment
    /// tooling (`mariadb`, `postgresql`, `mssql`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Some(Self::MySql),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            "sqlserver" | "mssql" => Some(Self::SqlServer),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::SqlServer => "sqlserver",
        }
    }

    /// Whether this build can open a store for the family.
    pub fn has_engine_adapter(self) -> bool {
        matches!(self, Self::Sqlite)
    }
}

impl Display for Dialect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
