use super::dml::{canonicalize, parse_assignments};
use super::*;
use crate::error::ErrorKind;
use crate::log::{LogRecord, MemoryLog};
use crate::query::SelectQuery;
use crate::table::{ConstraintDescriptor, FieldDescriptor};
use crate::types::Row;
use ntest::timeout;
use tempfile::{tempdir, TempDir};

fn open() -> (TempDir, Database) {
    let dir = tempdir().unwrap();
    let db = Database::open(DbConfig::with_data_dir(dir.path())).unwrap();
    (dir, db)
}

fn create_items(db: &mut Database) {
    db.create_table(
        "items",
        vec![
            FieldDescriptor::int("id"),
            FieldDescriptor::varchar("label", 4),
            FieldDescriptor::double("price"),
            FieldDescriptor::boolean("active"),
        ],
        vec![ConstraintDescriptor::primary_key("pk_items", "id")],
    )
    .unwrap();
}

#[timeout(1000)]
#[test]
fn test_parse_assignments() {
    assert_eq!(
        parse_assignments("a = 1, b = 'x y', c = NULL").unwrap(),
        vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "x y".to_string()),
            ("c".to_string(), "NULL".to_string()),
        ]
    );
    assert!(parse_assignments("").is_err());
    assert!(parse_assignments("a 1").is_err());
    assert!(parse_assignments("a = 1,").is_err());
    assert!(parse_assignments("a = 1, a = 2").is_err());
    assert!(parse_assignments("a > 1").is_err());
}

#[timeout(1000)]
#[test]
fn test_canonicalize_uses_stored_forms() {
    let fields = vec![
        FieldDescriptor::int("n"),
        FieldDescriptor::boolean("b"),
        FieldDescriptor::varchar("s", 3),
        FieldDescriptor::datetime("d"),
    ];
    let mut row: Row = [
        ("n", " 007"),
        ("b", "1"),
        ("s", "abcdef"),
        ("d", "2024-02-03"),
        ("extra", "kept"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    canonicalize(&fields, &mut row, false).unwrap();
    assert_eq!(row["n"], "7");
    assert_eq!(row["b"], "true");
    assert_eq!(row["s"], "abc");
    assert_eq!(row["d"], "'2024-02-03 00:00:00'");
    assert_eq!(row["extra"], "kept");

    let mut long: Row = [("s".to_string(), "abcdef".to_string())].into_iter().collect();
    let err = canonicalize(&fields, &mut long, true).unwrap_err();
    assert!(matches!(err, DbError::TypeMismatch { .. }));
}

#[timeout(1000)]
#[test]
fn test_insert_and_select() {
    let (_dir, mut db) = open();
    create_items(&mut db);

    let first = db.insert("items", None, &["1", "'pen'", "1.5", "true"]).unwrap();
    let second = db
        .insert("items", Some(&["label", "id"]), &["'ink'", "2"])
        .unwrap();
    assert_eq!(first.row_id, 1);
    assert_eq!(second.row_id, 2);

    let result = db.select(&SelectQuery::new("items").order_by("id")).unwrap();
    assert_eq!(result.values("label"), vec!["pen", "ink"]);
    assert_eq!(result.values("price"), vec!["1.5", "NULL"]);
    assert_eq!(result.values("active"), vec!["true", "NULL"]);
}

#[timeout(1000)]
#[test]
fn test_insert_rejects_bad_values() {
    let (_dir, mut db) = open();
    create_items(&mut db);

    let err = db.insert("items", None, &["1", "pen"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);

    let err = db.insert("items", Some(&["nope"]), &["1"]).unwrap_err();
    assert!(matches!(err, DbError::FieldNotFound { .. }));

    let err = db.insert("items", Some(&["id"]), &["abc"]).unwrap_err();
    assert!(matches!(err, DbError::TypeMismatch { .. }));

    let err = db.insert("missing", None, &["1"]).unwrap_err();
    assert!(matches!(err, DbError::TableNotFound { .. }));

    assert_eq!(db.table("items").unwrap().row_count().unwrap(), 0);
}

#[timeout(1000)]
#[test]
fn test_update_and_delete_counts() {
    let (_dir, mut db) = open();
    create_items(&mut db);
    for id in 1..=4 {
        let id = id.to_string();
        db.insert("items", Some(&["id", "price"]), &[id.as_str(), "2.0"]).unwrap();
    }

    assert_eq!(db.update("items", "price = 3.5", Some("id > 2")).unwrap(), 2);
    assert_eq!(db.update("items", "price = 9", Some("id > 100")).unwrap(), 0);
    let result = db.select(&SelectQuery::new("items").filter("price = 3.5")).unwrap();
    assert_eq!(result.values("id"), vec!["3", "4"]);

    assert_eq!(db.delete("items", Some("price < 3")).unwrap(), 2);
    assert_eq!(db.delete("items", Some("price < 3")).unwrap(), 0);
    assert_eq!(db.delete("items", None).unwrap(), 2);
    assert!(db.select(&SelectQuery::new("items")).unwrap().is_empty());

    // Ids keep growing after deletes
    let pointer = db.insert("items", Some(&["id"]), &["5"]).unwrap();
    assert_eq!(pointer.row_id, 5);
}

#[timeout(1000)]
#[test]
fn test_update_set_clause_errors() {
    let (_dir, mut db) = open();
    create_items(&mut db);
    db.insert("items", Some(&["id"]), &["1"]).unwrap();

    assert!(matches!(
        db.update("items", "missing = 1", None),
        Err(DbError::FieldNotFound { .. })
    ));
    assert!(matches!(
        db.update("items", "price = cheap", None),
        Err(DbError::TypeMismatch { .. })
    ));
    assert!(matches!(
        db.update("items", "price = ", None),
        Err(DbError::InvalidExpression { .. })
    ));
}

#[timeout(1000)]
#[test]
fn test_mutations_are_logged() {
    let dir = tempdir().unwrap();
    let log = MemoryLog::new();
    let mut db = Database::open(DbConfig::with_data_dir(dir.path()))
        .unwrap()
        .with_log(log.clone());
    create_items(&mut db);

    db.insert("items", Some(&["id", "label"]), &["1", "a"]).unwrap();
    db.update("items", "label = 'b'", Some("id = 1")).unwrap();
    db.delete("items", Some("id = 1")).unwrap();
    // Failed and empty mutations are not logged
    db.delete("items", Some("id = 1")).unwrap();
    db.insert("items", Some(&["id"]), &["NULL"]).unwrap_err();

    let records = log.records();
    assert_eq!(records.len(), 3);
    assert!(matches!(&records[0], LogRecord::Insert { row_id: 1, .. }));
    match &records[1] {
        LogRecord::Update {
            old_values,
            new_values,
            ..
        } => {
            assert_eq!(old_values["label"], "a");
            assert_eq!(new_values["label"], "b");
        }
        other => panic!("expected update, got {:?}", other),
    }
    assert!(matches!(&records[2], LogRecord::Delete { row_id: 1, .. }));
}

#[timeout(1000)]
#[test]
fn test_create_table_errors() {
    let (dir, mut db) = open();
    create_items(&mut db);

    let duplicate = db.create_table("items", vec![FieldDescriptor::int("id")], vec![]);
    assert!(matches!(duplicate, Err(DbError::TableAlreadyExists(_))));

    let bad_check = db.create_table(
        "orders",
        vec![FieldDescriptor::int("qty")],
        vec![ConstraintDescriptor::check("ck", "", "missing > 0")],
    );
    assert!(matches!(bad_check, Err(DbError::FieldNotFound { .. })));
    assert!(!dir.path().join("orders.tdf").exists());

    let bad_fk = db.create_table(
        "orders",
        vec![FieldDescriptor::int("item")],
        vec![ConstraintDescriptor::foreign_key("fk", "item", "nowhere.id")],
    );
    assert!(matches!(bad_fk, Err(DbError::TableNotFound { .. })));
    assert_eq!(db.table_names(), vec!["items"]);
}

#[timeout(1000)]
#[test]
fn test_catalog_written_on_create() {
    let (dir, mut db) = open();
    create_items(&mut db);
    db.create_index("idx_label", "items", &["label"]).unwrap();

    let config = DbConfig::with_data_dir(dir.path());
    let catalog = catalog::load(&config).unwrap();
    assert_eq!(catalog.tables.len(), 1);
    assert_eq!(catalog.tables[0].name, "items");
    assert_eq!(catalog.tables[0].indexes[0].name, "idx_label");
    assert!(dir.path().join("items.idx_label.tid").exists());
}

#[timeout(1000)]
#[test]
fn test_mutations_write_only_changed_indexes() {
    let (dir, mut db) = open();
    create_items(&mut db);
    db.create_index("idx_label", "items", &["label"]).unwrap();
    db.create_index("idx_price", "items", &["price"]).unwrap();
    let label_file = dir.path().join("items.idx_label.tid");
    let price_file = dir.path().join("items.idx_price.tid");

    db.insert("items", Some(&["id", "label"]), &["1", "'pen'"]).unwrap();
    assert!(label_file.exists());
    std::fs::remove_file(&label_file).unwrap();
    std::fs::remove_file(&price_file).unwrap();

    assert_eq!(db.update("items", "label = 'ink'", Some("id = 1")).unwrap(), 1);
    assert!(label_file.exists());
    assert!(!price_file.exists());

    // Rewriting a row with the same indexed values writes no index
    std::fs::remove_file(&label_file).unwrap();
    db.update("items", "label = 'ink', active = true", None).unwrap();
    assert!(!label_file.exists());
    assert!(!price_file.exists());

    db.update("items", "price = 2.5", None).unwrap();
    assert!(price_file.exists());
    assert!(db
        .table("items")
        .unwrap()
        .indexes()
        .iter()
        .all(|index| !index.has_unsaved_changes()));
}

#[timeout(1000)]
#[test]
fn test_index_lifecycle() {
    let (dir, mut db) = open();
    create_items(&mut db);

    db.create_index("idx_price", "items", &["price"]).unwrap();
    assert!(matches!(
        db.create_index("idx_price", "items", &["label"]),
        Err(DbError::IndexAlreadyExists(_))
    ));
    assert!(matches!(
        db.create_index("idx_bad", "items", &["nope"]),
        Err(DbError::FieldNotFound { .. })
    ));

    db.drop_index("idx_price").unwrap();
    assert!(!dir.path().join("items.idx_price.tid").exists());
    assert!(matches!(
        db.drop_index("idx_price"),
        Err(DbError::IndexNotFound(_))
    ));
}
