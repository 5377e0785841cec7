use super::io_utils::{classify_io_error, retry_io_operation, temp_path_for};
use super::*;
use crate::config::RewriteMode;
use crate::error::DbError;
use crate::table::FieldDescriptor;
use crate::types::Row;
use ntest::timeout;
use std::cell::Cell;
use std::path::Path;
use tempfile::tempdir;

fn fields() -> Vec<FieldDescriptor> {
    vec![FieldDescriptor::int("id"), FieldDescriptor::varchar("name", 8)]
}

fn row(id: i32, name: &str) -> Row {
    Row::from([
        ("id".to_string(), id.to_string()),
        ("name".to_string(), name.to_string()),
    ])
}

fn open_store(path: &Path) -> RecordStore {
    RecordStore::create(path, &fields(), false, false).unwrap()
}

#[timeout(1000)]
#[test]
fn test_append_assigns_increasing_row_ids() {
    let dir = tempdir().unwrap();
    let mut store = open_store(&dir.path().join("t.trd"));

    let first = store.append(&row(1, "a")).unwrap();
    let second = store.append(&row(2, "b")).unwrap();

    assert_eq!(first.row_id, 1);
    assert_eq!(second.row_id, 2);
    assert_eq!(store.next_row_id(), 3);

    let len = std::fs::metadata(store.path()).unwrap().len() as usize;
    assert_eq!(len, 2 * store.layout().row_size());
}

#[timeout(1000)]
#[test]
fn test_scan_returns_rows_in_file_order() {
    let dir = tempdir().unwrap();
    let mut store = open_store(&dir.path().join("t.trd"));
    store.append(&row(10, "x")).unwrap();
    store.append(&row(20, "y")).unwrap();

    let rows: Vec<StoredRow> = store.scan().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].values["id"], "10");
    assert_eq!(rows[1].values["name"], "y");

    // Restartable
    assert_eq!(store.scan().unwrap().count(), 2);
}

#[timeout(1000)]
#[test]
fn test_reopen_continues_row_ids() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.trd");
    {
        let mut store = open_store(&path);
        store.append(&row(1, "a")).unwrap();
        store.append(&row(2, "b")).unwrap();
    }

    let mut store = RecordStore::open(&path, &fields(), false, false).unwrap();
    assert_eq!(store.append(&row(3, "c")).unwrap().row_id, 3);
}

#[timeout(1000)]
#[test]
fn test_rewrite_tombstones_are_hidden_but_keep_ids() {
    let dir = tempdir().unwrap();
    let mut store = open_store(&dir.path().join("t.trd"));
    store.append(&row(1, "a")).unwrap();
    store.append(&row(2, "b")).unwrap();

    let mut rows: Vec<StoredRow> = store
        .scan_with_deleted()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    rows[1].deleted = true;
    store.rewrite(&rows, RewriteMode::Truncate).unwrap();

    assert_eq!(store.live_count().unwrap(), 1);
    assert_eq!(store.scan_with_deleted().unwrap().count(), 2);
    assert_eq!(store.max_row_id().unwrap(), 2);
    assert_eq!(store.append(&row(3, "c")).unwrap().row_id, 3);
}

#[timeout(1000)]
#[test]
fn test_atomic_rewrite_leaves_no_temp_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.trd");
    let mut store = open_store(&path);
    store.append(&row(1, "a")).unwrap();

    store
        .rewrite(&[StoredRow::live(1, row(5, "z"))], RewriteMode::AtomicRename)
        .unwrap();

    assert!(!temp_path_for(&path).exists());
    assert_eq!(store.get(1).unwrap().unwrap()["id"], "5");
}

#[timeout(1000)]
#[test]
fn test_get_and_scan_ids() {
    let dir = tempdir().unwrap();
    let mut store = open_store(&dir.path().join("t.trd"));
    for i in 1..=5 {
        store.append(&row(i * 10, "r")).unwrap();
    }

    assert_eq!(store.get(3).unwrap().unwrap()["id"], "30");
    assert!(store.get(99).unwrap().is_none());

    let ids = std::collections::HashSet::from([2, 4]);
    let found: Vec<u64> = store
        .scan_ids(&ids)
        .unwrap()
        .map(|r| r.unwrap().row_id)
        .collect();
    assert_eq!(found, vec![2, 4]);
}

#[timeout(1000)]
#[test]
fn test_set_deleted_flag_and_overwrite_in_place() {
    let dir = tempdir().unwrap();
    let mut store = open_store(&dir.path().join("t.trd"));
    store.append(&row(1, "a")).unwrap();
    store.append(&row(2, "b")).unwrap();

    assert!(store.set_deleted_flag(1, true).unwrap());
    assert!(store.get(1).unwrap().is_none());
    assert!(store.set_deleted_flag(1, false).unwrap());
    assert!(store.get(1).unwrap().is_some());
    assert!(!store.set_deleted_flag(7, true).unwrap());

    assert!(store.overwrite(2, &row(22, "bb")).unwrap());
    assert_eq!(store.get(2).unwrap().unwrap()["name"], "bb");
}

#[timeout(1000)]
#[test]
fn test_scan_stops_at_short_trailing_row() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.trd");
    let mut store = open_store(&path);
    store.append(&row(1, "a")).unwrap();

    let mut data = std::fs::read(&path).unwrap();
    data.extend_from_slice(&[1, 2, 3]);
    std::fs::write(&path, data).unwrap();

    assert_eq!(store.scan().unwrap().count(), 1);
}

#[timeout(1000)]
#[test]
fn test_scan_stops_at_malformed_delete_flag() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.trd");
    let mut store = open_store(&path);
    store.append(&row(1, "a")).unwrap();
    store.append(&row(2, "b")).unwrap();

    let mut data = std::fs::read(&path).unwrap();
    let row_size = store.layout().row_size();
    data[row_size + 8] = 7;
    std::fs::write(&path, data).unwrap();

    let rows: Vec<StoredRow> = store.scan().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows.len(), 1);
}

#[timeout(1000)]
#[test]
fn test_migrate_changes_layout() {
    let dir = tempdir().unwrap();
    let mut store = open_store(&dir.path().join("t.trd"));
    store.append(&row(1, "a")).unwrap();

    let mut new_fields = fields();
    new_fields.push(FieldDescriptor::boolean("active"));
    store
        .migrate(&new_fields, RewriteMode::Truncate, |mut values| {
            values.insert("active".to_string(), "true".to_string());
            values
        })
        .unwrap();

    let values = store.get(1).unwrap().unwrap();
    assert_eq!(values["active"], "true");
    assert_eq!(values["name"], "a");
}

#[timeout(1000)]
#[test]
fn test_classify_io_error() {
    let transient = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
    assert!(matches!(
        classify_io_error(transient, "read"),
        DbError::TransientIoError(_)
    ));
    let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    assert!(matches!(classify_io_error(missing, "read"), DbError::IoError(_)));
}

#[timeout(1000)]
#[test]
fn test_retry_io_operation_retries_transient_errors() {
    let calls = Cell::new(0);
    let result = retry_io_operation(
        || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(DbError::TransientIoError("busy".to_string()))
            } else {
                Ok(42)
            }
        },
        3,
        0,
        "test",
    );
    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls.get(), 3);

    let calls = Cell::new(0);
    let result: Result<(), DbError> = retry_io_operation(
        || {
            calls.set(calls.get() + 1);
            Err(DbError::IoError("denied".to_string()))
        },
        3,
        0,
        "test",
    );
    assert!(result.is_err());
    assert_eq!(calls.get(), 1);
}
