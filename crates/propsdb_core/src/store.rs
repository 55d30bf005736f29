//! Pooled entry point that routes each operation to its scope's pool.
//!
//! # Responsibility
//! - Own the shared-scope and owner-scope connection pools.
//! - Check out one connection per operation and run it through
//!   [`PropsService`].
//!
//! # Invariants
//! - Shared-scope operations only ever use the shared pool, owner-scope
//!   operations only the owner pool.
//! - A connection is held for exactly one operation.
//! - Repository readiness is checked once per pooled connection, on its
//!   first checkout.

use crate::config::PropsConfig;
use crate::db::{open_db, ConnectionPool, DbError, DbResult, PooledConnection};
use crate::model::input::{GroupDeletion, GroupInput};
use crate::model::scope::Scope;
use crate::repo::props_repo::{MutationOutcome, RepoError, SqlitePropsRepository};
use crate::service::props_service::{PropsService, PropsServiceError, ReadOutcome};
use log::info;

/// Property store over two bounded pools.
pub struct PropsStore {
    shared: ConnectionPool,
    owner: ConnectionPool,
}

impl PropsStore {
    /// Opens the configured database and builds both pools.
    ///
    /// Migrations are applied once up front so a broken schema fails here
    /// instead of on the first request.
    ///
    /// # Errors
    /// - `DbError::UnsupportedDialect` for dialects without an engine adapter.
    /// - Any open/migration error.
    pub fn open(config: &PropsConfig) -> DbResult<Self> {
        if !config.dialect.has_engine_adapter() {
            return Err(DbError::UnsupportedDialect(config.dialect));
        }
        drop(open_db(&config.database)?);

        info!(
            "event=store_open module=db status=ok dialect={} shared_limit={} owner_limit={}",
            config.dialect, config.shared.connection_limit, config.owner.connection_limit
        );
        Ok(Self::from_pools(
            ConnectionPool::new(config.shared_pool_settings()),
            ConnectionPool::new(config.owner_pool_settings()),
        ))
    }

    pub fn from_pools(shared: ConnectionPool, owner: ConnectionPool) -> Self {
        Self { shared, owner }
    }

    pub fn pool(&self, scope: &Scope) -> &ConnectionPool {
        match scope {
            Scope::Shared => &self.shared,
            Scope::Owner(_) => &self.owner,
        }
    }

    pub fn get_group(
        &self,
        scope: &Scope,
        document: &str,
        group: &str,
    ) -> Result<ReadOutcome, PropsServiceError> {
        self.with_service(scope, |service| service.get_group(scope, document, group))
    }

    pub fn get_groups<S: AsRef<str>>(
        &self,
        scope: &Scope,
        document: &str,
        filter: &[S],
    ) -> Result<ReadOutcome, PropsServiceError> {
        self.with_service(scope, |service| service.get_groups(scope, document, filter))
    }

    pub fn get_all(&self, scope: &Scope) -> Result<ReadOutcome, PropsServiceError> {
        self.with_service(scope, |service| service.get_all(scope))
    }

    pub fn set_properties(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
        groups: &[GroupInput],
    ) -> Result<MutationOutcome, PropsServiceError> {
        self.with_service(scope, |service| {
            service.set_properties(scope, document, expected_version, groups)
        })
    }

    pub fn delete_group(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
        group: &str,
    ) -> Result<MutationOutcome, PropsServiceError> {
        self.with_service(scope, |service| {
            service.delete_group(scope, document, expected_version, group)
        })
    }

    pub fn delete_properties(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
        groups: &[GroupDeletion],
        delete_document: bool,
    ) -> Result<MutationOutcome, PropsServiceError> {
        self.with_service(scope, |service| {
            service.delete_properties(scope, document, expected_version, groups, delete_document)
        })
    }

    fn with_service<T>(
        &self,
        scope: &Scope,
        run: impl FnOnce(&PropsService<SqlitePropsRepository<'_>>) -> Result<T, PropsServiceError>,
    ) -> Result<T, PropsServiceError> {
        let conn: PooledConnection<'_> = self
            .pool(scope)
            .get()
            .map_err(|err| PropsServiceError::from(RepoError::from(err)))?;
        if conn.is_fresh() {
            let ready = SqlitePropsRepository::try_new(&conn).map(|_| ());
            if let Err(err) = ready {
                conn.discard();
                return Err(err.into());
            }
        }
        run(&PropsService::new(SqlitePropsRepository::assume_ready(&conn)))
    }
}
