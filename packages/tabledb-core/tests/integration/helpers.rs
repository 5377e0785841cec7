//! Shared fixtures for the integration tests.

use tabledb_core::{ConstraintDescriptor, Database, DbConfig, FieldDescriptor};
use tempfile::{tempdir, TempDir};

/// Opens a database in a fresh temporary directory.
pub fn open_temp() -> (TempDir, Database) {
    let dir = tempdir().unwrap();
    let db = Database::open(DbConfig::with_data_dir(dir.path())).unwrap();
    (dir, db)
}

/// Reopens the database stored in `dir`.
pub fn reopen(dir: &TempDir) -> Database {
    Database::open(DbConfig::with_data_dir(dir.path())).unwrap()
}

/// `users(id INT PK, name VARCHAR(16) NOT NULL, age INT CHECK age >= 0)`.
pub fn create_users(db: &mut Database) {
    db.create_table(
        "users",
        vec![
            FieldDescriptor::int("id"),
            FieldDescriptor::varchar("name", 16),
            FieldDescriptor::int("age"),
        ],
        vec![
            ConstraintDescriptor::primary_key("pk_users", "id"),
            ConstraintDescriptor::not_null("nn_name", "name"),
            ConstraintDescriptor::check("ck_age", "age", "age >= 0"),
        ],
    )
    .unwrap();
}

/// `orders(oid INT PK, user_id INT FK users.id, qty INT)`.
pub fn create_orders(db: &mut Database) {
    db.create_table(
        "orders",
        vec![
            FieldDescriptor::int("oid"),
            FieldDescriptor::int("user_id"),
            FieldDescriptor::int("qty"),
        ],
        vec![
            ConstraintDescriptor::primary_key("pk_orders", "oid"),
            ConstraintDescriptor::foreign_key("fk_orders_user", "user_id", "users.id"),
        ],
    )
    .unwrap();
}

/// Inserts `(id, name, age)` into `users`.
pub fn insert_user(db: &mut Database, id: i64, name: &str, age: i64) {
    let id = id.to_string();
    let age = age.to_string();
    db.insert("users", None, &[id.as_str(), name, age.as_str()])
        .unwrap();
}
