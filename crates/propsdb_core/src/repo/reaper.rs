//! Orphan reclamation for one scope's tables.
//!
//! Runs inside the caller's transaction after every mutation:
//! 1. links whose document or group row is gone,
//! 2. groups linked to no document,
//! 3. leaves linked to no group.
//!
//! The order matters: removing a group in step 2 cascades its leaf links,
//! which is what makes step 3 find the newly orphaned leaves.

use super::props_repo::RepoResult;
use crate::model::scope::ScopeTables;
use rusqlite::Connection;

/// Row counts removed by one reclamation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub dangling_links: usize,
    pub groups: usize,
    pub leaves: usize,
}

impl ReclaimReport {
    pub fn is_empty(&self) -> bool {
        self.dangling_links == 0 && self.groups == 0 && self.leaves == 0
    }
}

pub(crate) fn reclaim_orphans(conn: &Connection, tables: &ScopeTables) -> RepoResult<ReclaimReport> {
    let mut report = ReclaimReport::default();

    report.dangling_links += conn.execute(
        &format!(
            "DELETE FROM {document_groups}
             WHERE document_id NOT IN (SELECT document_id FROM {documents})
                OR group_id NOT IN (SELECT group_id FROM {groups});",
            document_groups = tables.document_groups,
            documents = tables.documents,
            groups = tables.groups,
        ),
        [],
    )?;
    report.dangling_links += conn.execute(
        &format!(
            "DELETE FROM {group_leaves}
             WHERE group_id NOT IN (SELECT group_id FROM {groups})
                OR leaf_id NOT IN (SELECT leaf_id FROM {leaves});",
            group_leaves = tables.group_leaves,
            groups = tables.groups,
            leaves = tables.leaves,
        ),
        [],
    )?;

    report.groups = conn.execute(
        &format!(
            "DELETE FROM {groups}
             WHERE group_id NOT IN (SELECT group_id FROM {document_groups});",
            groups = tables.groups,
            document_groups = tables.document_groups,
        ),
        [],
    )?;

    // Cascade covers this when foreign keys are on; the explicit pass keeps
    // the link table clean on connections opened without them.
    conn.execute(
        &format!(
            "DELETE FROM {group_leaves}
             WHERE group_id NOT IN (SELECT group_id FROM {groups});",
            group_leaves = tables.group_leaves,
            groups = tables.groups,
        ),
        [],
    )?;

    report.leaves = conn.execute(
        &format!(
            "DELETE FROM {leaves}
             WHERE leaf_id NOT IN (SELECT leaf_id FROM {group_leaves});",
            leaves = tables.leaves,
            group_leaves = tables.group_leaves,
        ),
        [],
    )?;

    if !report.is_empty() {
        log::debug!(
            "event=props_reclaim module=repo status=ok tables={} links={} groups={} leaves={}",
            tables.documents,
            report.dangling_links,
            report.groups,
            report.leaves
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::reclaim_orphans;
    use crate::db::open_db_in_memory;
    use crate::model::scope::SHARED_TABLES;

    #[test]
    fn removes_unreferenced_groups_and_leaves() {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch(
            "INSERT INTO shared_documents (document_id, name) VALUES (1, 'doc');
             INSERT INTO shared_groups (group_id, name) VALUES (1, 'kept'), (2, 'orphan');
             INSERT INTO shared_leaves (leaf_id, name, value_json)
                 VALUES (1, 'a', '1'), (2, 'b', '2'), (3, 'c', '3');
             INSERT INTO shared_document_groups (document_id, group_id) VALUES (1, 1);
             INSERT INTO shared_group_leaves (group_id, leaf_id) VALUES (1, 1), (2, 2);",
        )
        .unwrap();

        let report = reclaim_orphans(&conn, &SHARED_TABLES).unwrap();
        assert_eq!(report.groups, 1);
        assert_eq!(report.leaves, 2);

        let groups: i64 = conn
            .query_row("SELECT COUNT(*) FROM shared_groups;", [], |row| row.get(0))
            .unwrap();
        let leaves: i64 = conn
            .query_row("SELECT COUNT(*) FROM shared_leaves;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(groups, 1);
        assert_eq!(leaves, 1);
    }

    #[test]
    fn clean_store_reports_nothing() {
        let conn = open_db_in_memory().unwrap();
        let report = reclaim_orphans(&conn, &SHARED_TABLES).unwrap();
        assert!(report.is_empty());
    }
}
