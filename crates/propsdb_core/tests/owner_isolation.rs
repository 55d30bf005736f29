use propsdb_core::db::open_db_in_memory;
use propsdb_core::{
    ErrorKind, GroupDeletion, GroupInput, PropsService, Scope, SqlitePropsRepository,
};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn service(conn: &Connection) -> PropsService<SqlitePropsRepository<'_>> {
    PropsService::new(SqlitePropsRepository::try_new(conn).unwrap())
}

fn theme(value: &str) -> Vec<GroupInput> {
    vec![GroupInput::new("ui").with_leaf("theme", json!(value))]
}

fn read_theme(service: &PropsService<SqlitePropsRepository<'_>>, scope: &Scope) -> serde_json::Value {
    service
        .get_group(scope, "prefs", "ui")
        .unwrap()
        .tree()
        .unwrap()
        .document("prefs")
        .unwrap()
        .group("ui")
        .unwrap()
        .leaf("theme")
        .unwrap()
        .clone()
}

#[test]
fn owners_never_see_each_other() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let u1 = Scope::Owner(Uuid::new_v4());
    let u2 = Scope::Owner(Uuid::new_v4());

    service.set_properties(&u1, "prefs", 0, &theme("dark")).unwrap();

    let err = service.get_group(&u2, "prefs", "ui").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = service.get_all(&u2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let outcome = service.set_properties(&u2, "prefs", 0, &theme("light")).unwrap();
    assert_eq!(outcome.new_version, 1, "same name for another owner is a new document");

    assert_eq!(read_theme(&service, &u1), json!("dark"));
    assert_eq!(read_theme(&service, &u2), json!("light"));

    let groups: i64 = conn
        .query_row("SELECT COUNT(*) FROM owner_groups WHERE name = 'ui';", [], |row| row.get(0))
        .unwrap();
    assert_eq!(groups, 2, "groups are not shared across owners");
}

#[test]
fn owner_and_shared_scopes_are_disjoint() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let owner = Scope::Owner(Uuid::new_v4());

    service.set_properties(&Scope::Shared, "prefs", 0, &theme("site")).unwrap();
    let err = service.get_group(&owner, "prefs", "ui").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    service.set_properties(&owner, "prefs", 0, &theme("mine")).unwrap();
    assert_eq!(read_theme(&service, &Scope::Shared), json!("site"));
    assert_eq!(read_theme(&service, &owner), json!("mine"));
}

#[test]
fn deletes_only_touch_the_callers_partition() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let u1 = Scope::Owner(Uuid::new_v4());
    let u2 = Scope::Owner(Uuid::new_v4());
    service.set_properties(&u1, "prefs", 0, &theme("dark")).unwrap();
    service.set_properties(&u2, "prefs", 0, &theme("light")).unwrap();

    service
        .delete_properties(&u1, "prefs", 1, &[GroupDeletion::whole_group("ui")], false)
        .unwrap();
    assert_eq!(
        service.get_group(&u1, "prefs", "ui").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(read_theme(&service, &u2), json!("light"));

    service.delete_properties(&u2, "prefs", 1, &[], true).unwrap();
    let documents: i64 = conn
        .query_row("SELECT COUNT(*) FROM owner_documents;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(documents, 1, "u1's emptied document remains");
}

#[test]
fn get_all_returns_only_the_owners_documents() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let u1 = Scope::Owner(Uuid::new_v4());
    let u2 = Scope::Owner(Uuid::new_v4());
    service.set_properties(&u1, "prefs", 0, &theme("dark")).unwrap();
    service
        .set_properties(&u1, "layout", 0, &[GroupInput::new("grid").with_leaf("cols", json!(3))])
        .unwrap();
    service.set_properties(&u2, "other", 0, &theme("light")).unwrap();

    let outcome = service.get_all(&u1).unwrap();
    let names: Vec<&str> = outcome
        .tree()
        .unwrap()
        .documents
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(names, ["layout", "prefs"]);
}
