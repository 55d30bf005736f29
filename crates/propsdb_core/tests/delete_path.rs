use propsdb_core::db::open_db_in_memory;
use propsdb_core::{
    ErrorKind, GroupDeletion, GroupInput, PropsService, PropsServiceError, ReadOutcome, Scope,
    SqlitePropsRepository,
};
use rusqlite::Connection;
use serde_json::json;

fn service(conn: &Connection) -> PropsService<SqlitePropsRepository<'_>> {
    PropsService::new(SqlitePropsRepository::try_new(conn).unwrap())
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn deleting_only_group_removes_it_physically() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    service
        .set_properties(
            &Scope::Shared,
            "doc1",
            0,
            &[GroupInput::new("cfg").with_leaf("a", json!(1))],
        )
        .unwrap();

    let outcome = service.delete_group(&Scope::Shared, "doc1", 1, "cfg").unwrap();
    assert_eq!(outcome.new_version, 2);
    assert_eq!(outcome.affected_rows, 1);

    let err = service.get_group(&Scope::Shared, "doc1", "cfg").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM shared_groups;"), 0);
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM shared_leaves WHERE name = 'a';"),
        0
    );
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM shared_group_leaves;"), 0);
    assert_eq!(
        count(&conn, "SELECT version FROM shared_documents WHERE name = 'doc1';"),
        2
    );
}

#[test]
fn group_shared_with_another_document_survives() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let scope = Scope::Shared;
    service
        .set_properties(&scope, "home", 0, &[GroupInput::new("shared").with_leaf("x", json!(1))])
        .unwrap();
    service
        .set_properties(&scope, "about", 0, &[GroupInput::new("shared").with_leaf("y", json!(2))])
        .unwrap();

    service.delete_group(&scope, "home", 1, "shared").unwrap();

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM shared_groups;"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM shared_leaves;"), 2);
    let outcome = service.get_group(&scope, "about", "shared").unwrap();
    let group = outcome
        .tree()
        .unwrap()
        .document("about")
        .unwrap()
        .group("shared")
        .unwrap()
        .clone();
    assert_eq!(group.leaves.len(), 2);
}

#[test]
fn deleting_unlinked_group_is_a_noop() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    service
        .set_properties(&Scope::Shared, "doc", 0, &[GroupInput::new("cfg").with_leaf("a", json!(1))])
        .unwrap();

    let outcome = service.delete_group(&Scope::Shared, "doc", 1, "other").unwrap();
    assert_eq!(outcome.new_version, 1);
    assert_eq!(outcome.affected_rows, 0);
}

#[test]
fn deleting_leaves_keeps_the_rest_of_the_group() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let scope = Scope::Shared;
    service
        .set_properties(
            &scope,
            "doc",
            0,
            &[GroupInput::new("cfg")
                .with_leaf("a", json!(1))
                .with_leaf("b", json!(2))],
        )
        .unwrap();

    let outcome = service
        .delete_properties(&scope, "doc", 1, &[GroupDeletion::leaves("cfg", ["a"])], false)
        .unwrap();
    assert_eq!(outcome.new_version, 2);
    assert_eq!(
        count(&conn, "SELECT COUNT(*) FROM shared_leaves WHERE name = 'a';"),
        0
    );

    let outcome = service.get_group(&scope, "doc", "cfg").unwrap();
    let group = outcome
        .tree()
        .unwrap()
        .document("doc")
        .unwrap()
        .group("cfg")
        .unwrap()
        .clone();
    assert_eq!(group.leaf("b"), Some(&json!(2)));
    assert_eq!(group.leaf("a"), None);

    service
        .delete_properties(&scope, "doc", 2, &[GroupDeletion::leaves("cfg", ["b"])], false)
        .unwrap();
    let outcome = service.get_group(&scope, "doc", "cfg").unwrap();
    assert_eq!(outcome, ReadOutcome::NoContent);
}

#[test]
fn delete_properties_advances_once_and_skips_unknown_groups() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let scope = Scope::Shared;
    service
        .set_properties(
            &scope,
            "doc",
            0,
            &[
                GroupInput::new("a").with_leaf("k", json!(1)),
                GroupInput::new("b").with_leaf("k", json!(2)),
            ],
        )
        .unwrap();

    let outcome = service
        .delete_properties(
            &scope,
            "doc",
            1,
            &[
                GroupDeletion::whole_group("a"),
                GroupDeletion::leaves("b", ["k"]),
                GroupDeletion::whole_group("missing"),
            ],
            false,
        )
        .unwrap();
    assert_eq!(outcome.new_version, 2);

    let outcome = service
        .delete_properties(&scope, "doc", 2, &[GroupDeletion::whole_group("missing")], false)
        .unwrap();
    assert_eq!(outcome.new_version, 2);
    assert_eq!(outcome.affected_rows, 0);
}

#[test]
fn delete_document_reclaims_everything_and_allows_recreate() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let scope = Scope::Shared;
    service
        .set_properties(&scope, "doc", 0, &[GroupInput::new("cfg").with_leaf("a", json!(1))])
        .unwrap();

    let outcome = service.delete_properties(&scope, "doc", 1, &[], true).unwrap();
    assert_eq!(outcome.new_version, 0);
    assert_eq!(outcome.affected_rows, 1);

    for table in [
        "shared_documents",
        "shared_groups",
        "shared_leaves",
        "shared_document_groups",
        "shared_group_leaves",
    ] {
        assert_eq!(count(&conn, &format!("SELECT COUNT(*) FROM {table};")), 0, "{table}");
    }

    let err = service.get_groups(&scope, "doc", &["cfg"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let outcome = service
        .set_properties(&scope, "doc", 0, &[GroupInput::new("cfg").with_leaf("a", json!(1))])
        .unwrap();
    assert_eq!(outcome.new_version, 1);
}

#[test]
fn deletes_require_existing_document_and_current_version() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let scope = Scope::Shared;

    let err = service.delete_group(&scope, "ghost", 0, "cfg").unwrap_err();
    assert!(matches!(err, PropsServiceError::NotFound(_)));
    let err = service.delete_properties(&scope, "ghost", 0, &[], true).unwrap_err();
    assert!(matches!(err, PropsServiceError::NotFound(_)));

    service
        .set_properties(&scope, "doc", 0, &[GroupInput::new("cfg").with_leaf("a", json!(1))])
        .unwrap();
    let err = service.delete_group(&scope, "doc", 0, "cfg").unwrap_err();
    assert!(matches!(
        err,
        PropsServiceError::VersionConflict {
            expected: 0,
            actual: Some(1),
            ..
        }
    ));
    let err = service.delete_properties(&scope, "doc", 7, &[], true).unwrap_err();
    assert!(err.is_retryable());

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM shared_leaves;"), 1);
}

#[test]
fn empty_deletion_list_keeps_document_and_version() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let scope = Scope::Shared;
    service
        .set_properties(&scope, "doc", 0, &[GroupInput::new("cfg").with_leaf("a", json!(1))])
        .unwrap();

    let outcome = service.delete_properties(&scope, "doc", 1, &[], false).unwrap();
    assert_eq!(outcome.new_version, 1);
    assert_eq!(outcome.affected_rows, 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM shared_leaves;"), 1);

    let err = service.delete_properties(&scope, "doc", 0, &[], false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionConflict);
    let err = service.delete_properties(&scope, "ghost", 0, &[], false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
