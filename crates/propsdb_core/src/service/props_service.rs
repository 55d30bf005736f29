//! Property store use-case service.
//!
//! # Responsibility
//! - Validate request shape before any storage access.
//! - Turn repository results into `Content | NoContent` reads and
//!   `(new_version, affected_rows)` mutations.
//! - Emit one metadata-only log event per operation.
//!
//! # Invariants
//! - Leaf values are never logged.
//! - `VersionConflict` is surfaced unchanged so callers can retry.

use crate::error::ErrorKind;
use crate::model::input::{normalize_group_filter, GroupDeletion, GroupInput};
use crate::model::scope::Scope;
use crate::model::tree::{PropsTree, VERSION_KEY};
use crate::repo::props_repo::{MutationOutcome, PropsRepository, RepoError};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Result of a read that found the requested documents.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// At least one leaf exists in the result.
    Content(PropsTree),
    /// Documents and groups exist but every group is empty.
    NoContent,
}

impl ReadOutcome {
    fn from_tree(tree: PropsTree) -> Self {
        if tree.has_content() {
            Self::Content(tree)
        } else {
            Self::NoContent
        }
    }

    pub fn tree(&self) -> Option<&PropsTree> {
        match self {
            Self::Content(tree) => Some(tree),
            Self::NoContent => None,
        }
    }
}

/// Service error for property use-cases.
#[derive(Debug)]
pub enum PropsServiceError {
    MissingDocument,
    EmptyGroupList,
    InvalidGroupName(String),
    InvalidLeafName { group: String, leaf: String },
    NotFound(String),
    VersionConflict {
        document: String,
        expected: u64,
        actual: Option<u64>,
    },
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl PropsServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingDocument
            | Self::EmptyGroupList
            | Self::InvalidGroupName(_)
            | Self::InvalidLeafName { .. } => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::VersionConflict { .. } => ErrorKind::VersionConflict,
            Self::Repo(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl Display for PropsServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDocument => write!(f, "document name is required"),
            Self::EmptyGroupList => write!(f, "at least one group is required"),
            Self::InvalidGroupName(name) => write!(f, "invalid group name: `{name}`"),
            Self::InvalidLeafName { group, leaf } => {
                write!(f, "invalid leaf name `{leaf}` in group `{group}`")
            }
            Self::NotFound(target) => write!(f, "not found: {target}"),
            Self::VersionConflict {
                document,
                expected,
                actual: Some(actual),
            } => write!(
                f,
                "version conflict on `{document}`: expected {expected}, stored {actual}"
            ),
            Self::VersionConflict {
                document, expected, ..
            } => write!(f, "version conflict on `{document}`: expected {expected}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PropsServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for PropsServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(target) => Self::NotFound(target),
            RepoError::VersionConflict {
                document,
                expected,
                actual,
            } => Self::VersionConflict {
                document,
                expected,
                actual,
            },
            other => Self::Repo(other),
        }
    }
}

/// Property service facade over repository implementations.
pub struct PropsService<R: PropsRepository> {
    repo: R,
}

impl<R: PropsRepository> PropsService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Reads one group of one document.
    pub fn get_group(
        &self,
        scope: &Scope,
        document: &str,
        group: &str,
    ) -> Result<ReadOutcome, PropsServiceError> {
        let started = Instant::now();
        let result = validate_document(document)
            .and_then(|()| validate_group_name(group))
            .and_then(|()| {
                self.repo
                    .get_group(scope, document, group)
                    .map_err(PropsServiceError::from)
            })
            .map(ReadOutcome::from_tree);
        log_read("props_get_group", scope, document, started, &result);
        result
    }

    /// Reads the groups of one document, all of them when `filter` is empty.
    pub fn get_groups<S: AsRef<str>>(
        &self,
        scope: &Scope,
        document: &str,
        filter: &[S],
    ) -> Result<ReadOutcome, PropsServiceError> {
        let started = Instant::now();
        let filter = normalize_group_filter(filter);
        let result = validate_document(document)
            .and_then(|()| {
                self.repo
                    .get_groups(scope, document, &filter)
                    .map_err(PropsServiceError::from)
            })
            .map(ReadOutcome::from_tree);
        log_read("props_get_groups", scope, document, started, &result);
        result
    }

    /// Reads every document of the scope.
    pub fn get_all(&self, scope: &Scope) -> Result<ReadOutcome, PropsServiceError> {
        let started = Instant::now();
        let result = self
            .repo
            .get_all(scope)
            .map_err(PropsServiceError::from)
            .map(ReadOutcome::from_tree);
        log_read("props_get_all", scope, "*", started, &result);
        result
    }

    /// Merges groups and leaves into a document.
    pub fn set_properties(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
        groups: &[GroupInput],
    ) -> Result<MutationOutcome, PropsServiceError> {
        let started = Instant::now();
        let result = validate_set(document, groups).and_then(|()| {
            self.repo
                .set_properties(scope, document, expected_version, groups)
                .map_err(PropsServiceError::from)
        });
        log_mutation("props_set", scope, document, expected_version, started, &result);
        result
    }

    /// Unlinks one group from a document.
    pub fn delete_group(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
        group: &str,
    ) -> Result<MutationOutcome, PropsServiceError> {
        let started = Instant::now();
        let result = validate_document(document)
            .and_then(|()| validate_group_name(group))
            .and_then(|()| {
                self.repo
                    .delete_group(scope, document, expected_version, group)
                    .map_err(PropsServiceError::from)
            });
        log_mutation(
            "props_delete_group",
            scope,
            document,
            expected_version,
            started,
            &result,
        );
        result
    }

    /// Deletes the whole document when `delete_document` is set, otherwise
    /// the listed groups and leaves.
    pub fn delete_properties(
        &self,
        scope: &Scope,
        document: &str,
        expected_version: u64,
        groups: &[GroupDeletion],
        delete_document: bool,
    ) -> Result<MutationOutcome, PropsServiceError> {
        let started = Instant::now();
        let (event, result) = if delete_document {
            let result = validate_document(document).and_then(|()| {
                self.repo
                    .delete_document(scope, document, expected_version)
                    .map_err(PropsServiceError::from)
            });
            ("props_delete_document", result)
        } else {
            let result = validate_delete(document, groups).and_then(|()| {
                self.repo
                    .delete_properties(scope, document, expected_version, groups)
                    .map_err(PropsServiceError::from)
            });
            ("props_delete_properties", result)
        };
        log_mutation(event, scope, document, expected_version, started, &result);
        result
    }
}

fn validate_document(document: &str) -> Result<(), PropsServiceError> {
    if document.trim().is_empty() {
        return Err(PropsServiceError::MissingDocument);
    }
    Ok(())
}

fn validate_group_name(group: &str) -> Result<(), PropsServiceError> {
    if group.trim().is_empty() || group == VERSION_KEY {
        return Err(PropsServiceError::InvalidGroupName(group.to_string()));
    }
    Ok(())
}

fn validate_set(document: &str, groups: &[GroupInput]) -> Result<(), PropsServiceError> {
    validate_document(document)?;
    if groups.is_empty() {
        return Err(PropsServiceError::EmptyGroupList);
    }
    for input in groups {
        validate_group_name(&input.group)?;
        if let Some(leaf) = input.leaves.keys().find(|leaf| leaf.trim().is_empty()) {
            return Err(PropsServiceError::InvalidLeafName {
                group: input.group.clone(),
                leaf: leaf.clone(),
            });
        }
    }
    Ok(())
}

/// An empty deletion list is accepted; storage treats it as a
/// version-checked no-op.
fn validate_delete(document: &str, groups: &[GroupDeletion]) -> Result<(), PropsServiceError> {
    validate_document(document)?;
    for deletion in groups {
        validate_group_name(&deletion.group)?;
        if let Some(leaf) = deletion.leaves.iter().find(|leaf| leaf.trim().is_empty()) {
            return Err(PropsServiceError::InvalidLeafName {
                group: deletion.group.clone(),
                leaf: leaf.clone(),
            });
        }
    }
    Ok(())
}

fn status_of(err: &PropsServiceError) -> &'static str {
    match err.kind() {
        ErrorKind::NotFound => "not_found",
        ErrorKind::VersionConflict => "conflict",
        ErrorKind::Validation => "invalid",
        ErrorKind::Authorization | ErrorKind::Infrastructure => "error",
    }
}

fn log_read(
    event: &str,
    scope: &Scope,
    document: &str,
    started: Instant,
    result: &Result<ReadOutcome, PropsServiceError>,
) {
    let duration_ms = started.elapsed().as_millis();
    match result {
        Ok(outcome) => info!(
            "event={event} module=service status=ok scope={} document={document} content={} duration_ms={duration_ms}",
            scope.label(),
            matches!(outcome, ReadOutcome::Content(_)),
        ),
        Err(err @ PropsServiceError::Repo(_)) => warn!(
            "event={event} module=service status=error scope={} document={document} duration_ms={duration_ms} error={err}",
            scope.label(),
        ),
        Err(err) => info!(
            "event={event} module=service status={} scope={} document={document} duration_ms={duration_ms}",
            status_of(err),
            scope.label(),
        ),
    }
}

fn log_mutation(
    event: &str,
    scope: &Scope,
    document: &str,
    expected_version: u64,
    started: Instant,
    result: &Result<MutationOutcome, PropsServiceError>,
) {
    let duration_ms = started.elapsed().as_millis();
    match result {
        Ok(outcome) => info!(
            "event={event} module=service status=ok scope={} document={document} expected_version={expected_version} new_version={} affected_rows={} duration_ms={duration_ms}",
            scope.label(),
            outcome.new_version,
            outcome.affected_rows,
        ),
        Err(err @ PropsServiceError::Repo(_)) => warn!(
            "event={event} module=service status=error scope={} document={document} expected_version={expected_version} duration_ms={duration_ms} error={err}",
            scope.label(),
        ),
        Err(err) => info!(
            "event={event} module=service status={} scope={} document={document} expected_version={expected_version} duration_ms={duration_ms}",
            status_of(err),
            scope.label(),
        ),
    }
}
