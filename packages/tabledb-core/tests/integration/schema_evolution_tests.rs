//! Adding, dropping and renaming fields on tables that already hold rows.

use ntest::timeout;
use tabledb_core::{ConstraintDescriptor, DbError, FieldDescriptor, SelectQuery};

use super::helpers::{create_orders, create_users, insert_user, open_temp, reopen};

#[timeout(5000)]
#[test]
fn test_add_field_fills_existing_rows() {
    let (dir, mut db) = open_temp();
    create_users(&mut db);
    insert_user(&mut db, 1, "ann", 30);
    insert_user(&mut db, 2, "bob", 40);

    db.add_field("users", FieldDescriptor::varchar("city", 12), Some("'Oslo'"))
        .unwrap();
    db.add_field("users", FieldDescriptor::double("score"), None)
        .unwrap();
    assert!(matches!(
        db.add_field("users", FieldDescriptor::int("age"), None),
        Err(DbError::FieldAlreadyExists { .. })
    ));

    let result = db.select(&SelectQuery::new("users").order_by("id")).unwrap();
    assert_eq!(result.values("city"), vec!["Oslo", "Oslo"]);
    assert_eq!(result.values("score"), vec!["NULL", "NULL"]);

    db.insert("users", Some(&["id", "name", "score"]), &["3", "cid", "2.5"])
        .unwrap();
    drop(db);

    let db = reopen(&dir);
    assert_eq!(
        db.table("users").unwrap().field_names(),
        vec!["id", "name", "age", "city", "score"]
    );
    let result = db.select(&SelectQuery::new("users").filter("score > 1")).unwrap();
    assert_eq!(result.values("name"), vec!["cid"]);
}

#[timeout(5000)]
#[test]
fn test_drop_field_removes_constraints_and_indexes() {
    let (dir, mut db) = open_temp();
    create_users(&mut db);
    db.create_index("idx_users_age", "users", &["age"]).unwrap();
    insert_user(&mut db, 1, "ann", 30);

    db.drop_field("users", "age").unwrap();
    let users = db.table("users").unwrap();
    assert_eq!(users.field_names(), vec!["id", "name"]);
    assert!(users.constraints.iter().all(|c| c.name != "ck_age"));
    assert!(users.index("idx_users_age").is_none());
    assert!(!dir.path().join("users.idx_users_age.tid").exists());

    let result = db.select(&SelectQuery::new("users")).unwrap();
    assert_eq!(result.values("name"), vec!["ann"]);
    assert!(!result.rows[0].contains_key("age"));

    // The dropped index name can be reused
    db.create_index("idx_users_age", "users", &["name"]).unwrap();
}

#[timeout(5000)]
#[test]
fn test_drop_referenced_field_refused() {
    let (_dir, mut db) = open_temp();
    create_users(&mut db);
    create_orders(&mut db);

    assert!(matches!(
        db.drop_field("users", "id"),
        Err(DbError::InvalidField { .. })
    ));
    assert!(matches!(
        db.drop_field("users", "missing"),
        Err(DbError::FieldNotFound { .. })
    ));

    db.add_constraint(
        "orders",
        ConstraintDescriptor::check("ck_qty", "", "qty > 0 OR oid < 0"),
    )
    .unwrap();
    assert!(matches!(
        db.drop_field("orders", "qty"),
        Err(DbError::InvalidField { .. })
    ));
}

#[timeout(5000)]
#[test]
fn test_rename_field_carries_references() {
    let (dir, mut db) = open_temp();
    create_users(&mut db);
    create_orders(&mut db);
    db.create_index("idx_users_id", "users", &["id"]).unwrap();
    insert_user(&mut db, 1, "ann", 30);
    db.insert("orders", None, &["10", "1", "1"]).unwrap();

    db.rename_field("users", "id", "user_id").unwrap();
    assert!(matches!(
        db.rename_field("users", "name", "age"),
        Err(DbError::FieldAlreadyExists { .. })
    ));
    drop(db);

    let mut db = reopen(&dir);
    let users = db.table("users").unwrap();
    assert!(users.field("id").is_none());
    assert!(users.index("idx_users_id").unwrap().covers("user_id"));
    let fk = db
        .table("orders")
        .unwrap()
        .constraints
        .iter()
        .find(|c| c.name == "fk_orders_user")
        .cloned()
        .unwrap();
    assert_eq!(fk.param, "users.user_id");

    // The primary key and foreign key follow the new name
    assert!(db.insert("users", None, &["1", "dup", "1"]).is_err());
    assert!(db.insert("orders", None, &["11", "2", "1"]).is_err());
    assert!(db.delete("users", Some("user_id = 1")).is_err());

    let result = db
        .select(&SelectQuery::new("users").filter("user_id = 1"))
        .unwrap();
    assert_eq!(result.values("name"), vec!["ann"]);
}

#[timeout(5000)]
#[test]
fn test_rename_field_rewrites_checks_and_reference_forms() {
    let (dir, mut db) = open_temp();
    create_users(&mut db);
    db.create_table(
        "reviews",
        vec![FieldDescriptor::int("rid"), FieldDescriptor::int("author")],
        vec![
            ConstraintDescriptor::primary_key("pk_reviews", "rid"),
            ConstraintDescriptor::foreign_key("fk_reviews_author", "author", "users ( id )"),
        ],
    )
    .unwrap();
    db.add_constraint(
        "users",
        ConstraintDescriptor::check("ck_adult", "", "age >= 18 OR name = 'root'"),
    )
    .unwrap();
    insert_user(&mut db, 1, "ann", 30);
    db.insert("reviews", None, &["1", "1"]).unwrap();

    db.rename_field("users", "age", "years").unwrap();
    db.rename_field("users", "id", "uid").unwrap();
    drop(db);

    let mut db = reopen(&dir);
    fn violation<T: std::fmt::Debug>(result: Result<T, DbError>) -> String {
        match result {
            Err(DbError::ConstraintViolation { name, .. }) => name,
            other => panic!("expected constraint violation, got {:?}", other),
        }
    }
    assert_eq!(violation(db.insert("users", None, &["2", "bob", "-5"])), "ck_age");
    assert_eq!(violation(db.insert("users", None, &["3", "cid", "10"])), "ck_adult");
    db.insert("users", None, &["4", "root", "10"]).unwrap();

    let users = db.table("users").unwrap();
    let check_of = |name: &str| {
        users
            .constraints
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.param.clone())
            .unwrap()
    };
    assert!(check_of("ck_age").contains("years"));
    assert!(!check_of("ck_adult").contains("age "));

    let fk = db
        .table("reviews")
        .unwrap()
        .constraints
        .iter()
        .find(|c| c.name == "fk_reviews_author")
        .cloned()
        .unwrap();
    assert_eq!(fk.param, "users.uid");
    assert!(db.insert("reviews", None, &["2", "9"]).is_err());
    db.insert("reviews", None, &["3", "4"]).unwrap();
    assert!(db.delete("users", Some("uid = 1")).is_err());
}

#[timeout(5000)]
#[test]
fn test_add_constraint_checks_existing_rows() {
    let (_dir, mut db) = open_temp();
    create_users(&mut db);
    insert_user(&mut db, 1, "ann", 30);
    insert_user(&mut db, 2, "bob", 30);

    let err = db
        .add_constraint("users", ConstraintDescriptor::unique("uq_age", "age"))
        .unwrap_err();
    assert!(matches!(err, DbError::ConstraintViolation { .. }));
    assert!(db.table("users").unwrap().constraints.iter().all(|c| c.name != "uq_age"));

    db.add_constraint("users", ConstraintDescriptor::unique("uq_name", "name"))
        .unwrap();
    assert!(matches!(
        db.add_constraint("users", ConstraintDescriptor::unique("uq_name", "age")),
        Err(DbError::ConstraintAlreadyExists { .. })
    ));
    assert!(db.insert("users", None, &["3", "ann", "5"]).is_err());

    db.drop_constraint("users", "uq_name").unwrap();
    db.insert("users", None, &["3", "ann", "5"]).unwrap();
    assert!(matches!(
        db.drop_constraint("users", "uq_name"),
        Err(DbError::ConstraintNotFound { .. })
    ));
}
