//! Delete paths: one group, selected leaves, or the whole document.
//!
//! All three lock the document first and require it to exist. Removing a
//! link never touches rows still referenced elsewhere; whatever becomes
//! unreferenced is left to the reaper before commit.

use super::props_repo::{
    advance_version, ensure_version, lock_document, query_ids, to_db_version, LockedDocument,
    MutationOutcome, RepoError, RepoResult,
};
use super::reaper::reclaim_orphans;
use crate::model::input::GroupDeletion;
use crate::model::scope::{Scope, ScopeTables};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

pub(crate) fn delete_group(
    conn: &Connection,
    scope: &Scope,
    document: &str,
    expected_version: u64,
    group: &str,
) -> RepoResult<MutationOutcome> {
    let tables = scope.tables();
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let locked = lock_existing(&tx, scope, document, expected_version)?;

    let changed = match linked_group_id(&tx, tables, locked.document_id, group)? {
        Some(group_id) => unlink_group(&tx, tables, locked.document_id, group_id)?,
        None => false,
    };

    finish(tx, tables, document, locked, changed)
}

/// Applies each deletion in order. An empty leaf list unlinks the group; a
/// non-empty list removes only those leaves from it.
pub(crate) fn delete_properties(
    conn: &Connection,
    scope: &Scope,
    document: &str,
    expected_version: u64,
    groups: &[GroupDeletion],
) -> RepoResult<MutationOutcome> {
    let tables = scope.tables();
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let locked = lock_existing(&tx, scope, document, expected_version)?;

    let mut changed = false;
    for deletion in groups {
        let Some(group_id) = linked_group_id(&tx, tables, locked.document_id, &deletion.group)?
        else {
            continue;
        };

        if deletion.leaves.is_empty() {
            changed |= unlink_group(&tx, tables, locked.document_id, group_id)?;
        } else {
            changed |= unlink_leaves(&tx, tables, group_id, &deletion.leaves)?;
        }
    }

    finish(tx, tables, document, locked, changed)
}

/// Removes the document row and its group links. The outcome's
/// `affected_rows` is the number of document rows deleted.
pub(crate) fn delete_document(
    conn: &Connection,
    scope: &Scope,
    document: &str,
    expected_version: u64,
) -> RepoResult<MutationOutcome> {
    let tables = scope.tables();
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let locked = lock_existing(&tx, scope, document, expected_version)?;

    tx.execute(
        &format!(
            "DELETE FROM {} WHERE document_id = ?1;",
            tables.document_groups
        ),
        params![locked.document_id],
    )?;
    let removed = remove_document(&tx, tables, document, locked)?;

    reclaim_orphans(&tx, tables)?;
    tx.commit()?;
    Ok(MutationOutcome {
        new_version: 0,
        affected_rows: removed as u64,
    })
}

/// Deletes the document row guarded by the version read under the lock.
fn remove_document(
    conn: &Connection,
    tables: &ScopeTables,
    document: &str,
    locked: LockedDocument,
) -> RepoResult<usize> {
    let removed = conn.execute(
        &format!(
            "DELETE FROM {} WHERE document_id = ?1 AND version = ?2;",
            tables.documents
        ),
        params![locked.document_id, to_db_version(locked.version)?],
    )?;
    if removed == 0 {
        return Err(RepoError::VersionConflict {
            document: document.to_string(),
            expected: locked.version,
            actual: None,
        });
    }
    Ok(removed)
}

fn lock_existing(
    conn: &Connection,
    scope: &Scope,
    document: &str,
    expected_version: u64,
) -> RepoResult<LockedDocument> {
    let locked = lock_document(conn, scope, document)?
        .ok_or_else(|| RepoError::NotFound(format!("document `{document}`")))?;
    ensure_version(document, expected_version, Some(locked))?;
    Ok(locked)
}

fn finish(
    tx: Transaction<'_>,
    tables: &ScopeTables,
    document: &str,
    locked: LockedDocument,
    changed: bool,
) -> RepoResult<MutationOutcome> {
    reclaim_orphans(&tx, tables)?;
    let outcome = if changed {
        advance_version(&tx, tables, document, locked)?
    } else {
        MutationOutcome::unchanged(locked.version)
    };
    tx.commit()?;
    Ok(outcome)
}

fn linked_group_id(
    conn: &Connection,
    tables: &ScopeTables,
    document_id: i64,
    group: &str,
) -> RepoResult<Option<i64>> {
    let group_id = conn
        .query_row(
            &format!(
                "SELECT g.group_id
                 FROM {groups} g
                 INNER JOIN {document_groups} dg ON dg.group_id = g.group_id
                 WHERE dg.document_id = ?1
                   AND g.name = ?2
                 LIMIT 1;",
                groups = tables.groups,
                document_groups = tables.document_groups,
            ),
            params![document_id, group],
            |row| row.get(0),
        )
        .optional()?;
    Ok(group_id)
}

fn unlink_group(
    conn: &Connection,
    tables: &ScopeTables,
    document_id: i64,
    group_id: i64,
) -> RepoResult<bool> {
    let removed = conn.execute(
        &format!(
            "DELETE FROM {} WHERE document_id = ?1 AND group_id = ?2;",
            tables.document_groups
        ),
        params![document_id, group_id],
    )?;
    Ok(removed > 0)
}

fn unlink_leaves(
    conn: &Connection,
    tables: &ScopeTables,
    group_id: i64,
    leaves: &[String],
) -> RepoResult<bool> {
    let placeholders = vec!["?"; leaves.len()].join(", ");
    let mut binds = vec![Value::Integer(group_id)];
    binds.extend(leaves.iter().cloned().map(Value::Text));
    let leaf_ids = query_ids(
        conn,
        &format!(
            "SELECT l.leaf_id
             FROM {leaves} l
             INNER JOIN {group_leaves} gl ON gl.leaf_id = l.leaf_id
             WHERE gl.group_id = ?
               AND l.name IN ({placeholders});",
            leaves = tables.leaves,
            group_leaves = tables.group_leaves,
        ),
        binds,
    )?;

    let mut removed = 0;
    for leaf_id in leaf_ids {
        removed += conn.execute(
            &format!(
                "DELETE FROM {} WHERE group_id = ?1 AND leaf_id = ?2;",
                tables.group_leaves
            ),
            params![group_id, leaf_id],
        )?;
    }
    Ok(removed > 0)
}
