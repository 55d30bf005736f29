//! Upsert path: merge groups and leaves into one document.

use super::props_repo::{
    advance_version, ensure_version, lock_document, owner_bind, LockedDocument, MutationOutcome,
    RepoError, RepoResult,
};
use super::reaper::reclaim_orphans;
use crate::model::input::GroupInput;
use crate::model::scope::{Scope, ScopeTables};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior};

/// Merges `groups` into `document`.
///
/// A missing document is created at version 0 when `expected_version` is 0.
/// Leaves whose stored JSON text is identical are left alone; the version
/// only advances when at least one link, leaf insert or leaf update happened.
pub(crate) fn set_properties(
    conn: &Connection,
    scope: &Scope,
    document: &str,
    expected_version: u64,
    groups: &[GroupInput],
) -> RepoResult<MutationOutcome> {
    let tables = scope.tables();
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let existing = lock_document(&tx, scope, document)?;
    ensure_version(document, expected_version, existing)?;
    let locked = match existing {
        Some(locked) => locked,
        None => create_document(&tx, scope, document)?,
    };

    let mut dirty = false;
    for input in groups {
        let group_id = find_or_create_group(&tx, scope, &input.group)?;
        dirty |= link_group(&tx, tables, locked.document_id, group_id)?;

        for (name, value) in &input.leaves {
            let encoded = serde_json::to_string(value).map_err(RepoError::Encode)?;
            dirty |= upsert_leaf(&tx, tables, group_id, name, &encoded)?;
        }
    }

    reclaim_orphans(&tx, tables)?;
    let outcome = if dirty {
        advance_version(&tx, tables, document, locked)?
    } else {
        MutationOutcome::unchanged(locked.version)
    };
    tx.commit()?;
    Ok(outcome)
}

fn create_document(conn: &Connection, scope: &Scope, document: &str) -> RepoResult<LockedDocument> {
    let tables = scope.tables();
    match owner_bind(scope) {
        Some(owner) => conn.execute(
            &format!(
                "INSERT INTO {} (owner_id, name, version) VALUES (?1, ?2, 0);",
                tables.documents
            ),
            params![owner, document],
        )?,
        None => conn.execute(
            &format!("INSERT INTO {} (name, version) VALUES (?1, 0);", tables.documents),
            params![document],
        )?,
    };

    Ok(LockedDocument {
        document_id: conn.last_insert_rowid(),
        version: 0,
    })
}

fn find_or_create_group(conn: &Connection, scope: &Scope, name: &str) -> RepoResult<i64> {
    let tables = scope.tables();
    let mut filter = String::from("name = ?");
    let mut binds = vec![Value::Text(name.to_string())];
    if let Some(owner) = owner_bind(scope) {
        filter.push_str(" AND owner_id = ?");
        binds.push(owner);
    }

    let existing = conn
        .query_row(
            &format!(
                "SELECT group_id FROM {} WHERE {filter} LIMIT 1;",
                tables.groups
            ),
            params_from_iter(binds.iter()),
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    if let Some(group_id) = existing {
        return Ok(group_id);
    }

    let columns = if tables.owner_scoped { "name, owner_id" } else { "name" };
    let placeholders = vec!["?"; binds.len()].join(", ");
    conn.execute(
        &format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders});",
            tables.groups
        ),
        params_from_iter(binds.iter()),
    )?;
    Ok(conn.last_insert_rowid())
}

/// Returns `true` when a new link was created.
fn link_group(
    conn: &Connection,
    tables: &ScopeTables,
    document_id: i64,
    group_id: i64,
) -> RepoResult<bool> {
    let inserted = conn.execute(
        &format!(
            "INSERT OR IGNORE INTO {} (document_id, group_id) VALUES (?1, ?2);",
            tables.document_groups
        ),
        params![document_id, group_id],
    )?;
    Ok(inserted > 0)
}

/// Returns `true` when the leaf was inserted or its value changed.
fn upsert_leaf(
    conn: &Connection,
    tables: &ScopeTables,
    group_id: i64,
    name: &str,
    encoded: &str,
) -> RepoResult<bool> {
    let existing = conn
        .query_row(
            &format!(
                "SELECT l.leaf_id, l.value_json
                 FROM {leaves} l
                 INNER JOIN {group_leaves} gl ON gl.leaf_id = l.leaf_id
                 WHERE gl.group_id = ?1
                   AND l.name = ?2
                 ORDER BY l.leaf_id ASC
                 LIMIT 1;",
                leaves = tables.leaves,
                group_leaves = tables.group_leaves,
            ),
            params![group_id, name],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    match existing {
        Some((_, stored)) if stored == encoded => Ok(false),
        Some((leaf_id, _)) => {
            conn.execute(
                &format!(
                    "UPDATE {}
                     SET value_json = ?2,
                         updated_at = (strftime('%s', 'now') * 1000)
                     WHERE leaf_id = ?1;",
                    tables.leaves
                ),
                params![leaf_id, encoded],
            )?;
            Ok(true)
        }
        None => {
            conn.execute(
                &format!(
                    "INSERT INTO {} (name, value_json) VALUES (?1, ?2);",
                    tables.leaves
                ),
                params![name, encoded],
            )?;
            let leaf_id = conn.last_insert_rowid();
            conn.execute(
                &format!(
                    "INSERT INTO {} (group_id, leaf_id) VALUES (?1, ?2);",
                    tables.group_leaves
                ),
                params![group_id, leaf_id],
            )?;
            Ok(true)
        }
    }
}
