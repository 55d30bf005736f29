use propsdb_core::db::migrations::latest_version;
use propsdb_core::db::{open_db, open_db_in_memory, DbError};
use propsdb_core::{RepoError, SqlitePropsRepository};
use rusqlite::Connection;

const SCOPE_TABLES: &[&str] = &[
    "shared_documents",
    "shared_groups",
    "shared_leaves",
    "shared_document_groups",
    "shared_group_leaves",
    "owner_documents",
    "owner_groups",
    "owner_leaves",
    "owner_document_groups",
    "owner_group_leaves",
];

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in SCOPE_TABLES {
        assert_table_exists(&conn, table);
    }
    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1);
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("props.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "owner_documents");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn owner_documents_are_unique_per_owner_and_name() {
    let conn = open_db_in_memory().unwrap();
    let owner = "00000000-0000-0000-0000-000000000001";
    conn.execute(
        "INSERT INTO owner_documents (owner_id, name) VALUES (?1, 'prefs');",
        [owner],
    )
    .unwrap();

    let duplicate = conn.execute(
        "INSERT INTO owner_documents (owner_id, name) VALUES (?1, 'prefs');",
        [owner],
    );
    assert!(duplicate.is_err());

    conn.execute(
        "INSERT INTO owner_documents (owner_id, name)
         VALUES ('00000000-0000-0000-0000-000000000002', 'prefs');",
        [],
    )
    .unwrap();
}

#[test]
fn repository_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqlitePropsRepository::try_new(&conn).err().unwrap();
    assert!(matches!(
        err,
        RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
