//! Environment-driven store configuration.
//!
//! # Invariants
//! - Numbers that fail to parse are errors, never silently defaulted.
//! - Credentials are only required for dialects that use them.
//! - `AUTHZ_URL` and `AUTHZ_CLIENT_ID` are set together or not at all.

use crate::db::{Dialect, PoolSettings};
use crate::error::ErrorKind;
use crate::service::auth_service::AuthorizerSettings;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;

pub const DEFAULT_CONNECTION_LIMIT: usize = 5;

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    InvalidNumber { key: &'static str, value: String },
    UnknownDialect(String),
    /// One half of a key pair is set without the other.
    IncompletePair {
        present: &'static str,
        missing: &'static str,
    },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "{key} is required"),
            Self::InvalidNumber { key, value } => {
                write!(f, "{key} must be a positive integer, got `{value}`")
            }
            Self::UnknownDialect(value) => write!(f, "DB_TYPE `{value}` is not supported"),
            Self::IncompletePair { present, missing } => {
                write!(f, "{present} is set but {missing} is missing")
            }
        }
    }
}

impl Error for ConfigError {}

/// Credentials and pool cap for one scope.
#[derive(Clone, PartialEq, Eq)]
pub struct ScopeCredentials {
    pub user: Option<String>,
    pub password: Option<String>,
    pub connection_limit: usize,
}

impl Debug for ScopeCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeCredentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connection_limit", &self.connection_limit)
            .finish()
    }
}

/// Resolved store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropsConfig {
    pub dialect: Dialect,
    /// Database name; the database file path for SQLite.
    pub database: PathBuf,
    /// Shared-scope credential set (`DB_APP_*`).
    pub shared: ScopeCredentials,
    /// Owner-scope credential set (`DB_*`).
    pub owner: ScopeCredentials,
    pub authorizer: Option<AuthorizerSettings>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl PropsConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let dialect = match get("DB_TYPE") {
            Some(value) => Dialect::parse(&value).ok_or(ConfigError::UnknownDialect(value))?,
            None => Dialect::Sqlite,
        };
        let database = get("DB_APP_DATABASE")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("DB_APP_DATABASE"))?;

        let shared = ScopeCredentials {
            user: get("DB_APP_USER"),
            password: get("DB_APP_PASSWORD"),
            connection_limit: parse_limit("DB_APP_CONNECTION_LIMIT", get("DB_APP_CONNECTION_LIMIT"))?,
        };
        let owner = ScopeCredentials {
            user: get("DB_USER"),
            password: get("DB_PASSWORD"),
            connection_limit: parse_limit("DB_CONNECTION_LIMIT", get("DB_CONNECTION_LIMIT"))?,
        };
        if dialect != Dialect::Sqlite {
            if shared.user.is_none() {
                return Err(ConfigError::Missing("DB_APP_USER"));
            }
            if owner.user.is_none() {
                return Err(ConfigError::Missing("DB_USER"));
            }
        }

        let authorizer = match (get("AUTHZ_URL"), get("AUTHZ_CLIENT_ID")) {
            (Some(url), Some(client_id)) => Some(AuthorizerSettings::new(url, client_id)),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::IncompletePair {
                    present: "AUTHZ_URL",
                    missing: "AUTHZ_CLIENT_ID",
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::IncompletePair {
                    present: "AUTHZ_CLIENT_ID",
                    missing: "AUTHZ_URL",
                })
            }
        };

        Ok(Self {
            dialect,
            database,
            shared,
            owner,
            authorizer,
            log_level: get("LOG_LEVEL"),
            log_dir: get("LOG_DIR").map(PathBuf::from),
        })
    }

    /// Builds a SQLite configuration for `database` with default limits.
    pub fn sqlite(database: impl Into<PathBuf>) -> Self {
        let credentials = ScopeCredentials {
            user: None,
            password: None,
            connection_limit: DEFAULT_CONNECTION_LIMIT,
        };
        Self {
            dialect: Dialect::Sqlite,
            database: database.into(),
            shared: credentials.clone(),
            owner: credentials,
            authorizer: None,
            log_level: None,
            log_dir: None,
        }
    }

    pub fn shared_pool_settings(&self) -> PoolSettings {
        PoolSettings::new("shared", &self.database, self.shared.connection_limit)
    }

    pub fn owner_pool_settings(&self) -> PoolSettings {
        PoolSettings::new("owner", &self.database, self.owner.connection_limit)
    }
}

fn parse_limit(key: &'static str, value: Option<String>) -> Result<usize, ConfigError> {
    let Some(value) = value else {
        return Ok(DEFAULT_CONNECTION_LIMIT);
    };
    match value.parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(limit),
        _ => Err(ConfigError::InvalidNumber { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, PropsConfig, DEFAULT_CONNECTION_LIMIT};
    use crate::db::Dialect;
    use crate::service::auth_service::{AuthorizerSettings, DEFAULT_PING_TIMEOUT};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn load(pairs: &[(&str, &str)]) -> Result<PropsConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        PropsConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn sqlite_needs_only_database() {
        let config = load(&[("DB_APP_DATABASE", "/tmp/props.db")]).unwrap();
        assert_eq!(config.dialect, Dialect::Sqlite);
        assert_eq!(config.database, PathBuf::from("/tmp/props.db"));
        assert_eq!(config.shared.connection_limit, DEFAULT_CONNECTION_LIMIT);
        assert_eq!(config.owner.connection_limit, DEFAULT_CONNECTION_LIMIT);
        assert!(config.authorizer.is_none());
    }

    #[test]
    fn server_dialects_require_users() {
        let err = load(&[("DB_TYPE", "mysql"), ("DB_APP_DATABASE", "props")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DB_APP_USER"));

        let config = load(&[
            ("DB_TYPE", "postgresql"),
            ("DB_APP_DATABASE", "props"),
            ("DB_APP_USER", "app"),
            ("DB_USER", "owner"),
            ("DB_CONNECTION_LIMIT", "12"),
        ])
        .unwrap();
        assert_eq!(config.dialect, Dialect::Postgres);
        assert_eq!(config.owner.connection_limit, 12);
        assert_eq!(config.owner_pool_settings().max_connections, 12);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = load(&[("DB_APP_DATABASE", "x"), ("DB_APP_CONNECTION_LIMIT", "many")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { key: "DB_APP_CONNECTION_LIMIT", .. }));

        let err = load(&[("DB_APP_DATABASE", "x"), ("DB_CONNECTION_LIMIT", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));

        let err = load(&[("DB_APP_DATABASE", "x"), ("DB_TYPE", "oracle")]).unwrap_err();
        assert_eq!(err, ConfigError::UnknownDialect("oracle".to_string()));

        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("DB_APP_DATABASE"));
    }

    #[test]
    fn authorizer_keys_come_in_pairs() {
        let err = load(&[("DB_APP_DATABASE", "x"), ("AUTHZ_URL", "http://authz")]).unwrap_err();
        assert!(matches!(err, ConfigError::IncompletePair { missing: "AUTHZ_CLIENT_ID", .. }));

        let config = load(&[
            ("DB_APP_DATABASE", "x"),
            ("AUTHZ_URL", "http://authz"),
            ("AUTHZ_CLIENT_ID", "client"),
        ])
        .unwrap();
        assert_eq!(
            config.authorizer,
            Some(AuthorizerSettings::new("http://authz", "client"))
        );
        assert_eq!(config.authorizer.unwrap().ping_timeout, DEFAULT_PING_TIMEOUT);
    }

    #[test]
    fn debug_output_redacts_passwords() {
        let config = load(&[("DB_APP_DATABASE", "x"), ("DB_APP_PASSWORD", "hunter2")]).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
