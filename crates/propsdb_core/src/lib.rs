//! Core of propsdb: a versioned, hierarchical property store.
//!
//! Data is organized as documents → groups → leaves (JSON values) in two
//! partitions: an application-wide shared scope and a per-owner scope. Every
//! mutation is guarded by optimistic concurrency on the document version and
//! reclaims groups and leaves nothing references any more.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use config::{ConfigError, PropsConfig};
pub use db::{open_db, open_db_in_memory, DbError, Dialect};
pub use error::ErrorKind;
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::input::{
    normalize_group_filter, DeleteRequest, GroupDeletion, GroupInput, SetRequest, VersionRequest,
};
pub use model::scope::{OwnerId, Scope};
pub use model::tree::{DocumentNode, GroupNode, PropsTree, VERSION_KEY};
pub use repo::props_repo::{
    MutationOutcome, PropsRepository, RepoError, RepoResult, SqlitePropsRepository,
};
pub use service::auth_service::{AuthError, Authorizer, AuthorizerSettings, UserIdentity};
pub use service::props_service::{PropsService, PropsServiceError, ReadOutcome};
pub use store::PropsStore;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
