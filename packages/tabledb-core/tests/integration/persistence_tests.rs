//! Persistence tests: data, schema, indexes and the catalog survive a reopen,
//! and rejected or empty mutations leave table files untouched.

use std::fs;

use ntest::timeout;
use tabledb_core::{
    Database, DbConfig, DbError, ErrorKind, FieldDescriptor, RewriteMode, SelectQuery,
};
use tabledb_core::codec::ROW_HEADER_SIZE;
use tempfile::tempdir;

use super::helpers::{create_orders, create_users, insert_user, open_temp, reopen};

/// Test 1: rows, schema and constraints are read back after a reopen.
#[timeout(5000)]
#[test]
fn test_reopen_restores_tables() {
    let (dir, mut db) = open_temp();
    create_users(&mut db);
    create_orders(&mut db);
    insert_user(&mut db, 1, "ann", 30);
    insert_user(&mut db, 2, "bob", 40);
    db.delete("users", Some("id = 2")).unwrap();
    drop(db);

    let mut db = reopen(&dir);
    assert_eq!(db.table_names(), vec!["orders", "users"]);
    let users = db.table("users").unwrap();
    assert_eq!(users.field_names(), vec!["id", "name", "age"]);
    assert_eq!(users.constraints.len(), 3);

    let result = db.select(&SelectQuery::new("users")).unwrap();
    assert_eq!(result.values("name"), vec!["ann"]);

    // Constraints are still enforced and row ids continue after the tombstone
    assert!(db.insert("users", None, &["1", "dup", "1"]).is_err());
    let pointer = db.insert("users", None, &["3", "cid", "50"]).unwrap();
    assert_eq!(pointer.row_id, 3);
}

/// Test 2: indexes are reloaded from their files and kept in step.
#[timeout(5000)]
#[test]
fn test_reopen_reloads_indexes() {
    let (dir, mut db) = open_temp();
    create_users(&mut db);
    db.create_index("idx_users_age", "users", &["age"]).unwrap();
    for id in 1..=50 {
        insert_user(&mut db, id, "user", id % 7);
    }
    drop(db);

    let mut db = reopen(&dir);
    let index = db.table("users").unwrap().index("idx_users_age").unwrap();
    assert_eq!(index.tree().len(), 50);
    assert!(index.tree().validate().is_ok());
    assert_eq!(index.find("3").len(), 7);

    db.update("users", "age = 100", Some("age = 3")).unwrap();
    let index = db.table("users").unwrap().index("idx_users_age").unwrap();
    assert!(index.find("3").is_empty());
    assert_eq!(index.find("100").len(), 7);

    let indexed = db
        .select(&SelectQuery::new("users").filter("age >= 5").order_by("id"))
        .unwrap();
    assert_eq!(indexed.len(), 21);
}

/// Test 3: a missing index file is reported when the database opens.
#[timeout(5000)]
#[test]
fn test_missing_index_file_fails_open() {
    let (dir, mut db) = open_temp();
    create_users(&mut db);
    db.create_index("idx_users_name", "users", &["name"]).unwrap();
    drop(db);

    fs::remove_file(dir.path().join("users.idx_users_name.tid")).unwrap();
    let err = Database::open(DbConfig::with_data_dir(dir.path())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexFileUnavailable);
}

/// Test 3b: reindexing rewrites index files from the live rows.
#[timeout(5000)]
#[test]
fn test_reindex_restores_index_file() {
    let (dir, mut db) = open_temp();
    create_users(&mut db);
    db.create_index("idx_users_name", "users", &["name"]).unwrap();
    insert_user(&mut db, 1, "ann", 30);
    insert_user(&mut db, 2, "bob", 40);

    let path = dir.path().join("users.idx_users_name.tid");
    fs::remove_file(&path).unwrap();
    db.reindex("users").unwrap();
    assert!(path.exists());
    drop(db);

    let db = reopen(&dir);
    let index = db.table("users").unwrap().index("idx_users_name").unwrap();
    assert_eq!(index.find("bob").len(), 1);
}

/// Test 4: a rejected insert leaves the record file byte-identical.
#[timeout(5000)]
#[test]
fn test_rejected_insert_leaves_file_untouched() {
    let (dir, mut db) = open_temp();
    create_users(&mut db);
    insert_user(&mut db, 1, "ann", 30);
    let path = dir.path().join("users.trd");
    let before = fs::read(&path).unwrap();

    assert!(db.insert("users", None, &["1", "dup", "20"]).is_err());
    assert!(db.insert("users", None, &["2", "NULL", "20"]).is_err());
    assert!(db.insert("users", None, &["3", "neg", "-5"]).is_err());
    assert!(db.update("users", "age = -1", None).is_err());

    assert_eq!(fs::read(&path).unwrap(), before);
}

/// Test 5: deleting with no matching rows returns 0 and does not rewrite.
#[timeout(5000)]
#[test]
fn test_idempotent_delete() {
    let (dir, mut db) = open_temp();
    create_users(&mut db);
    insert_user(&mut db, 1, "ann", 30);
    insert_user(&mut db, 2, "bob", 40);

    assert_eq!(db.delete("users", Some("id = 2")).unwrap(), 1);
    let path = dir.path().join("users.trd");
    let before = fs::read(&path).unwrap();

    assert_eq!(db.delete("users", Some("id = 2")).unwrap(), 0);
    assert_eq!(db.delete("users", Some("age > 100")).unwrap(), 0);
    assert_eq!(fs::read(&path).unwrap(), before);
}

/// Test 6: rewrites through a temporary file behave like in-place rewrites.
#[timeout(5000)]
#[test]
fn test_atomic_rename_rewrites() {
    let dir = tempdir().unwrap();
    let config = DbConfig {
        rewrite_mode: RewriteMode::AtomicRename,
        ..DbConfig::with_data_dir(dir.path())
    };
    let mut db = Database::open(config.clone()).unwrap();
    create_users(&mut db);
    for id in 1..=5 {
        insert_user(&mut db, id, "user", 10);
    }

    assert_eq!(db.update("users", "age = 11", Some("id <= 2")).unwrap(), 2);
    assert_eq!(db.delete("users", Some("id = 5")).unwrap(), 1);
    assert!(!dir.path().join("users.trd.tmp").exists());
    drop(db);

    let db = Database::open(config).unwrap();
    let result = db
        .select(&SelectQuery::new("users").order_by("id"))
        .unwrap();
    assert_eq!(result.values("age"), vec!["11", "11", "10", "10"]);
}

/// Test 7: dropping a table removes its files and its catalog entry.
#[timeout(5000)]
#[test]
fn test_drop_table_removes_files() {
    let (dir, mut db) = open_temp();
    db.create_table("scratch", vec![FieldDescriptor::int("n")], vec![])
        .unwrap();
    db.create_index("idx_scratch_n", "scratch", &["n"]).unwrap();
    db.insert("scratch", None, &["1"]).unwrap();

    db.drop_table("scratch").unwrap();
    for extension in ["trd", "tdf", "tic"] {
        assert!(!dir.path().join(format!("scratch.{}", extension)).exists());
    }
    assert!(!dir.path().join("scratch.idx_scratch_n.tid").exists());
    assert!(matches!(
        db.select(&SelectQuery::new("scratch")),
        Err(DbError::TableNotFound { .. })
    ));
    drop(db);

    assert!(reopen(&dir).table_names().is_empty());
}

/// Test 8: a corrupt record is reported with its source file.
#[timeout(5000)]
#[test]
fn test_corrupt_record_detected() {
    let (dir, mut db) = open_temp();
    create_users(&mut db);
    insert_user(&mut db, 1, "ann", 30);
    drop(db);

    let path = dir.path().join("users.trd");
    let mut bytes = fs::read(&path).unwrap();
    // Null flag of the first field, right after the row header
    bytes[ROW_HEADER_SIZE] = 7;
    fs::write(&path, bytes).unwrap();

    let db = reopen(&dir);
    let err = db.select(&SelectQuery::new("users")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptRecord);
}
