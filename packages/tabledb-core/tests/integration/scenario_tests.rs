//! End-to-end behaviour of constraints, indexes and queries.

use ntest::timeout;
use tabledb_core::{
    ConstraintDescriptor, DbError, ErrorKind, FieldDescriptor, SelectQuery,
};

use super::helpers::{create_orders, create_users, insert_user, open_temp};

/// A duplicate primary key is rejected and the table keeps one row.
#[timeout(5000)]
#[test]
fn test_duplicate_primary_key_rejected() {
    let (_dir, mut db) = open_temp();
    create_users(&mut db);
    insert_user(&mut db, 1, "ann", 30);

    let err = db.insert("users", None, &["1", "bob", "40"]).unwrap_err();
    match &err {
        DbError::ConstraintViolation { name, .. } => assert_eq!(name, "pk_users"),
        other => panic!("expected constraint violation, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

    let result = db.select(&SelectQuery::new("users")).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.values("name"), vec!["ann"]);
}

/// Range lookups on an integer index return keys in numeric order.
#[timeout(5000)]
#[test]
fn test_index_range_lookup() {
    let (_dir, mut db) = open_temp();
    db.create_table("t", vec![FieldDescriptor::int("id")], vec![])
        .unwrap();
    db.create_index("idx_t_id", "t", &["id"]).unwrap();
    for id in ["5", "3", "8", "1", "9", "2"] {
        db.insert("t", None, &[id]).unwrap();
    }

    let table = db.table("t").unwrap();
    let index = table.index("idx_t_id").unwrap();
    let ids: Vec<String> = index
        .find_range("2", "8")
        .into_iter()
        .map(|entry| {
            let row = table.store().get(entry.pointer.row_id).unwrap().unwrap();
            row["id"].clone()
        })
        .collect();
    assert_eq!(ids, vec!["2", "3", "5", "8"]);

    // Numeric ordering, not text ordering
    let wide = index.find_range("1", "10");
    assert_eq!(wide.len(), 6);
}

/// An update reports every matched row and the new values are visible.
#[timeout(5000)]
#[test]
fn test_bulk_update_count() {
    let (_dir, mut db) = open_temp();
    create_users(&mut db);
    for id in 1..=10 {
        insert_user(&mut db, id, "user", 20);
    }

    let updated = db.update("users", "age = 21", Some("age = 20")).unwrap();
    assert_eq!(updated, 10);

    let result = db
        .select(&SelectQuery::new("users").filter("age = 21").order_by("id"))
        .unwrap();
    assert_eq!(result.len(), 10);
    assert_eq!(result.values("id")[9], "10");
}

/// Rows with a NULL group key form their own group.
#[timeout(5000)]
#[test]
fn test_group_count_with_null_group() {
    let (_dir, mut db) = open_temp();
    db.create_table(
        "staff",
        vec![FieldDescriptor::int("id"), FieldDescriptor::varchar("dept", 8)],
        vec![],
    )
    .unwrap();
    let rows = [
        ("1", "eng"),
        ("2", "ops"),
        ("3", "NULL"),
        ("4", "eng"),
        ("5", "NULL"),
        ("6", "ops"),
        ("7", "eng"),
    ];
    for (id, dept) in rows {
        db.insert("staff", None, &[id, dept]).unwrap();
    }

    let query = SelectQuery::new("staff")
        .columns(["dept", "COUNT(*)"])
        .group_by("dept");
    let result = db.select(&query).unwrap();
    assert_eq!(result.columns, vec!["dept", "COUNT(*)"]);
    assert_eq!(result.values("dept"), vec!["eng", "ops", "NULL"]);
    assert_eq!(result.values("COUNT(*)"), vec!["3", "2", "2"]);
}

/// A referenced row cannot be deleted until the referencing row is gone.
#[timeout(5000)]
#[test]
fn test_referenced_row_delete_refused() {
    let (_dir, mut db) = open_temp();
    create_users(&mut db);
    create_orders(&mut db);
    insert_user(&mut db, 1, "ann", 30);
    db.insert("orders", None, &["100", "1", "2"]).unwrap();

    let err = db.delete("users", Some("id = 1")).unwrap_err();
    match &err {
        DbError::ReferentialIntegrityViolation {
            referencing_table, ..
        } => assert_eq!(referencing_table, "orders"),
        other => panic!("expected referential integrity error, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::ReferentialIntegrity);
    assert_eq!(db.table("users").unwrap().row_count().unwrap(), 1);

    assert_eq!(db.delete("orders", Some("oid = 100")).unwrap(), 1);
    assert_eq!(db.delete("users", Some("id = 1")).unwrap(), 1);
}

/// Inserts referencing a missing parent are rejected; NULL references pass.
#[timeout(5000)]
#[test]
fn test_foreign_key_on_insert() {
    let (_dir, mut db) = open_temp();
    create_users(&mut db);
    create_orders(&mut db);
    insert_user(&mut db, 1, "ann", 30);

    let err = db.insert("orders", None, &["1", "2", "1"]).unwrap_err();
    assert!(matches!(err, DbError::ConstraintViolation { ref name, .. } if name == "fk_orders_user"));

    db.insert("orders", None, &["1", "1", "1"]).unwrap();
    db.insert("orders", None, &["2", "NULL", "1"]).unwrap();
    assert_eq!(db.table("orders").unwrap().row_count().unwrap(), 2);

    // The parent table cannot be dropped while referenced
    assert!(matches!(
        db.drop_table("users"),
        Err(DbError::ReferentialIntegrityViolation { .. })
    ));
}

/// CHECK, NOT NULL, DEFAULT and AUTO_INCREMENT applied on insert.
#[timeout(5000)]
#[test]
fn test_generated_and_checked_values() {
    let (_dir, mut db) = open_temp();
    db.create_table(
        "tickets",
        vec![
            FieldDescriptor::int("id"),
            FieldDescriptor::varchar("status", 8),
            FieldDescriptor::int("priority"),
        ],
        vec![
            ConstraintDescriptor::auto_increment("ai_id", "id"),
            ConstraintDescriptor::default_value("df_status", "status", "open"),
            ConstraintDescriptor::check("ck_priority", "priority", "priority >= 1 AND priority <= 5"),
        ],
    )
    .unwrap();

    db.insert("tickets", Some(&["priority"]), &["3"]).unwrap();
    db.insert("tickets", Some(&["priority", "status"]), &["1", "'done'"])
        .unwrap();
    let err = db.insert("tickets", Some(&["priority"]), &["9"]).unwrap_err();
    assert!(matches!(err, DbError::ConstraintViolation { ref name, .. } if name == "ck_priority"));

    let result = db
        .select(&SelectQuery::new("tickets").order_by("id"))
        .unwrap();
    assert_eq!(result.values("id"), vec!["1", "2"]);
    assert_eq!(result.values("status"), vec!["open", "done"]);

    // A CHECK on a NULL value passes
    db.insert("tickets", Some(&["priority"]), &["NULL"]).unwrap();
    assert_eq!(db.table("tickets").unwrap().row_count().unwrap(), 3);
}

/// Updates that would duplicate a unique value are rejected as a whole.
#[timeout(5000)]
#[test]
fn test_update_unique_violation_is_atomic() {
    let (_dir, mut db) = open_temp();
    create_users(&mut db);
    insert_user(&mut db, 1, "ann", 30);
    insert_user(&mut db, 2, "bob", 40);

    let err = db.update("users", "id = 7", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

    let result = db.select(&SelectQuery::new("users").order_by("id")).unwrap();
    assert_eq!(result.values("id"), vec!["1", "2"]);

    let err = db.update("users", "age = -1", Some("id = 2")).unwrap_err();
    assert!(matches!(err, DbError::ConstraintViolation { ref name, .. } if name == "ck_age"));
}

/// Joined queries over two tables with filtering and ordering.
#[timeout(5000)]
#[test]
fn test_join_filter_order() {
    join_filter_order().unwrap();
}

fn join_filter_order() -> anyhow::Result<()> {
    let (_dir, mut db) = open_temp();
    create_users(&mut db);
    create_orders(&mut db);
    insert_user(&mut db, 1, "ann", 30);
    insert_user(&mut db, 2, "bob", 40);
    db.insert("orders", None, &["10", "1", "5"])?;
    db.insert("orders", None, &["11", "2", "1"])?;
    db.insert("orders", None, &["12", "1", "3"])?;

    let query = SelectQuery::new("orders")
        .join("users", "orders.user_id", "users.id")
        .columns(["users.name", "qty"])
        .filter("qty > 1")
        .order_by("qty DESC");
    let result = db.select(&query)?;
    assert_eq!(result.values("users.name"), vec!["ann", "ann"]);
    assert_eq!(result.values("qty"), vec!["5", "3"]);

    let totals = SelectQuery::new("orders")
        .columns(["user_id", "SUM(qty)"])
        .group_by("user_id")
        .having("SUM(qty) > 2");
    let result = db.select(&totals)?;
    assert_eq!(result.values("user_id"), vec!["1"]);
    assert_eq!(result.values("SUM(qty)"), vec!["8"]);
    Ok(())
}
