//! Hierarchical reads folded into [`PropsTree`].
//!
//! Every read is one join over document → link → group → link → leaf. The
//! leaf side is a left join so a linked group without leaves still yields a
//! row (and therefore an empty group node instead of NotFound).

use super::props_repo::{owner_bind, RepoError, RepoResult};
use crate::model::scope::Scope;
use crate::model::tree::PropsTree;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

struct TreeRow {
    document: String,
    version: i64,
    group: String,
    leaf: Option<String>,
    value_json: Option<String>,
}

pub(crate) fn get_group(
    conn: &Connection,
    scope: &Scope,
    document: &str,
    group: &str,
) -> RepoResult<PropsTree> {
    let mut conditions = vec!["d.name = ?", "g.name = ?"];
    let mut binds = vec![
        Value::Text(document.to_string()),
        Value::Text(group.to_string()),
    ];
    push_owner(scope, &mut conditions, &mut binds);

    let tree = load_tree(conn, scope, &conditions, binds)?;
    if tree.is_empty() {
        return Err(RepoError::NotFound(format!(
            "group `{group}` of document `{document}`"
        )));
    }
    Ok(tree)
}

pub(crate) fn get_groups(
    conn: &Connection,
    scope: &Scope,
    document: &str,
    filter: &[String],
) -> RepoResult<PropsTree> {
    let in_clause = format!("g.name IN ({})", vec!["?"; filter.len()].join(", "));
    let mut conditions = vec!["d.name = ?"];
    let mut binds = vec![Value::Text(document.to_string())];
    push_owner(scope, &mut conditions, &mut binds);

    if !filter.is_empty() {
        conditions.push(in_clause.as_str());
        binds.extend(filter.iter().cloned().map(Value::Text));
    }

    let tree = load_tree(conn, scope, &conditions, binds)?;
    if tree.is_empty() {
        return Err(RepoError::NotFound(format!("document `{document}`")));
    }
    Ok(tree)
}

pub(crate) fn get_all(conn: &Connection, scope: &Scope) -> RepoResult<PropsTree> {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();
    push_owner(scope, &mut conditions, &mut binds);

    let tree = load_tree(conn, scope, &conditions, binds)?;
    if tree.is_empty() {
        return Err(RepoError::NotFound(format!("documents in {} scope", scope.label())));
    }
    Ok(tree)
}

fn push_owner(scope: &Scope, conditions: &mut Vec<&str>, binds: &mut Vec<Value>) {
    if let Some(owner) = owner_bind(scope) {
        conditions.push("d.owner_id = ?");
        binds.push(owner);
    }
}

fn load_tree(
    conn: &Connection,
    scope: &Scope,
    conditions: &[&str],
    binds: Vec<Value>,
) -> RepoResult<PropsTree> {
    let tables = scope.tables();
    let mut sql = format!(
        "SELECT
            d.name,
            d.version,
            g.name,
            l.name,
            l.value_json
         FROM {documents} d
         INNER JOIN {document_groups} dg ON dg.document_id = d.document_id
         INNER JOIN {groups} g ON g.group_id = dg.group_id
         LEFT JOIN {group_leaves} gl ON gl.group_id = g.group_id
         LEFT JOIN {leaves} l ON l.leaf_id = gl.leaf_id",
        documents = tables.documents,
        document_groups = tables.document_groups,
        groups = tables.groups,
        group_leaves = tables.group_leaves,
        leaves = tables.leaves,
    );
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY d.name ASC, g.name ASC, l.name ASC;");

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut tree = PropsTree::new();
    while let Some(row) = rows.next()? {
        fold_row(&mut tree, parse_tree_row(row)?)?;
    }
    Ok(tree)
}

fn parse_tree_row(row: &Row<'_>) -> rusqlite::Result<TreeRow> {
    Ok(TreeRow {
        document: row.get(0)?,
        version: row.get(1)?,
        group: row.get(2)?,
        leaf: row.get(3)?,
        value_json: row.get(4)?,
    })
}

fn fold_row(tree: &mut PropsTree, row: TreeRow) -> RepoResult<()> {
    let version = u64::try_from(row.version).map_err(|_| {
        RepoError::InvalidData(format!(
            "negative version `{}` for document `{}`",
            row.version, row.document
        ))
    })?;
    let group = tree.document_mut(&row.document, version).group_mut(&row.group);

    let (Some(leaf), Some(raw)) = (row.leaf, row.value_json) else {
        return Ok(());
    };
    let value = serde_json::from_str(&raw).map_err(|err| {
        RepoError::InvalidData(format!(
            "leaf `{leaf}` in group `{}` holds invalid JSON: {err}",
            row.group
        ))
    })?;
    group.leaves.insert(leaf, value);
    Ok(())
}
