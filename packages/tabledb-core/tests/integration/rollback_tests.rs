//! Row-level undo primitives and compaction.

use ntest::timeout;
use tabledb_core::{DbError, LogRecord, MemoryLog, SelectQuery};

use super::helpers::{create_users, insert_user, open_temp};

/// Replays the inverse of each logged mutation, newest first.
fn undo(db: &mut tabledb_core::Database, records: &[LogRecord]) {
    for record in records.iter().rev() {
        match record {
            LogRecord::Insert { table, row_id, .. } => {
                db.rollback_insert_by_rowid(table, *row_id).unwrap()
            }
            LogRecord::Delete { table, row_id, .. } => {
                db.rollback_delete_by_rowid(table, *row_id).unwrap()
            }
            LogRecord::Update {
                table,
                row_id,
                old_values,
                ..
            } => {
                let values: Vec<(&str, &str)> = old_values
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                db.rollback_update_by_rowid(table, *row_id, &values).unwrap()
            }
        }
    }
}

#[timeout(5000)]
#[test]
fn test_log_replay_restores_state() {
    let (_dir, db) = open_temp();
    let log = MemoryLog::new();
    let mut db = db.with_log(log.clone());
    create_users(&mut db);
    insert_user(&mut db, 1, "ann", 30);
    insert_user(&mut db, 2, "bob", 40);
    log.drain();

    insert_user(&mut db, 3, "cid", 50);
    db.update("users", "age = 99", Some("id <= 2")).unwrap();
    db.delete("users", Some("id = 1")).unwrap();
    let records = log.drain();
    assert_eq!(records.len(), 4);

    undo(&mut db, &records);
    let result = db.select(&SelectQuery::new("users").order_by("id")).unwrap();
    assert_eq!(result.values("id"), vec!["1", "2"]);
    assert_eq!(result.values("age"), vec!["30", "40"]);

    // Rollbacks are not logged themselves
    assert!(log.is_empty());
}

#[timeout(5000)]
#[test]
fn test_rollback_keeps_indexes_in_step() {
    let (_dir, mut db) = open_temp();
    create_users(&mut db);
    db.create_index("idx_users_age", "users", &["age"]).unwrap();
    let pointer = db.insert("users", None, &["1", "ann", "30"]).unwrap();

    db.rollback_update_by_rowid("users", pointer.row_id, &[("age", "31")])
        .unwrap();
    let index = db.table("users").unwrap().index("idx_users_age").unwrap();
    assert!(index.find("30").is_empty());
    assert_eq!(index.find("31").len(), 1);

    db.rollback_insert_by_rowid("users", pointer.row_id).unwrap();
    let index = db.table("users").unwrap().index("idx_users_age").unwrap();
    assert!(index.tree().is_empty());

    db.rollback_delete_by_rowid("users", pointer.row_id).unwrap();
    let index = db.table("users").unwrap().index("idx_users_age").unwrap();
    assert_eq!(index.find("31").len(), 1);
}

#[timeout(5000)]
#[test]
fn test_rollback_missing_rows() {
    let (_dir, mut db) = open_temp();
    create_users(&mut db);
    insert_user(&mut db, 1, "ann", 30);

    assert!(matches!(
        db.rollback_insert_by_rowid("users", 42),
        Err(DbError::RowNotFound { row_id: 42, .. })
    ));
    assert!(matches!(
        db.rollback_delete_by_rowid("users", 42),
        Err(DbError::RowNotFound { .. })
    ));
    assert!(matches!(
        db.rollback_update_by_rowid("users", 42, &[("age", "1")]),
        Err(DbError::RowNotFound { .. })
    ));

    // Undoing a delete of a live row is a no-op
    db.rollback_delete_by_rowid("users", 1).unwrap();
    assert_eq!(db.table("users").unwrap().row_count().unwrap(), 1);
}

#[timeout(5000)]
#[test]
fn test_compact_drops_tombstones() {
    let (dir, mut db) = open_temp();
    create_users(&mut db);
    for id in 1..=6 {
        insert_user(&mut db, id, "user", 20);
    }
    db.delete("users", Some("id >= 4")).unwrap();
    let before = std::fs::metadata(dir.path().join("users.trd")).unwrap().len();

    // Rows 4 and 5 go; row 6 stays as the highest id
    assert_eq!(db.compact("users").unwrap(), 2);
    assert_eq!(db.compact("users").unwrap(), 0);
    let after = std::fs::metadata(dir.path().join("users.trd")).unwrap().len();
    assert!(after < before);

    let pointer = db.insert("users", None, &["7", "new", "1"]).unwrap();
    assert_eq!(pointer.row_id, 7);

    // Rows removed by compaction cannot be restored
    assert!(matches!(
        db.rollback_delete_by_rowid("users", 4),
        Err(DbError::RowNotFound { .. })
    ));
    db.rollback_delete_by_rowid("users", 6).unwrap();
    assert_eq!(db.table("users").unwrap().row_count().unwrap(), 5);
}
