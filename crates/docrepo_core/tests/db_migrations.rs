use docrepo_core::db::migrations::{latest_version, schema_version};
use docrepo_core::db::{open_db, open_db_in_memory, DbError};
use docrepo_core::{KeyValueStore, StoreError, StoreSettings};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_creates_keys_collection() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    assert_object_exists(&conn, "table", "Keys");
    assert_object_exists(&conn, "index", "Keys__key");
}

#[test]
fn keys_collection_rejects_duplicate_keys() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        r#"INSERT INTO "Keys" (body) VALUES ('{"key":"k","value":"1"}')"#,
        [],
    )
    .unwrap();

    let duplicate = conn.execute(
        r#"INSERT INTO "Keys" (body) VALUES ('{"key":"k","value":"2"}')"#,
        [],
    );
    assert!(duplicate.is_err());
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.sqlite3");

    let first = open_db(&path).unwrap();
    assert_eq!(schema_version(&first).unwrap(), latest_version());
    drop(first);

    let second = open_db(&path).unwrap();
    assert_eq!(schema_version(&second).unwrap(), latest_version());
    assert_object_exists(&second, "table", "Keys");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
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
fn store_open_surfaces_schema_errors_as_storage_failures() {
    let dir = tempfile::tempdir().unwrap();
    let conn = Connection::open(dir.path().join("app.sqlite3")).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let settings = StoreSettings::new(dir.path().to_str().unwrap(), "app");
    let err = KeyValueStore::open(&settings).err().unwrap();
    assert!(matches!(
        err,
        StoreError::Storage(DbError::UnsupportedSchemaVersion { .. })
    ));
}

#[tokio::test]
async fn values_persist_in_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let settings = StoreSettings::new(format!("sqlite://{}", dir.path().display()), "prefs");

    KeyValueStore::open(&settings)
        .unwrap()
        .set("volume", &7_u8)
        .await
        .unwrap();

    let reopened = KeyValueStore::open(&settings).unwrap();
    assert_eq!(reopened.get::<u8>("volume").await.unwrap(), 7);
}

fn assert_object_exists(conn: &Connection, kind: &str, name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "{kind} {name} does not exist");
}
