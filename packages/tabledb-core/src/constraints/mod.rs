//! Constraint engine: gates every insert, update and delete before the record
//! store is touched.
//!
//! Generative constraints (DEFAULT, AUTO_INCREMENT) fill in values first, in
//! declared order, whatever their position relative to validating constraints.
//! Validating constraints then run in declared order and the first failure
//! aborts the mutation.

mod check_expr;

pub use check_expr::CheckExpr;

use std::collections::{HashMap, HashSet};

use crate::error::DbError;
use crate::expr::CompareOp;
use crate::table::{ConstraintDescriptor, ConstraintKind, Table};
use crate::types::{is_null, values_equal, Row, NULL};

/// Tables visible to constraint checks, by name.
pub type Tables = HashMap<String, Table>;

/// Validates a CHECK expression against the table's fields at declaration time.
pub(crate) fn validate_check(table: &Table, constraint: &ConstraintDescriptor) -> Result<(), DbError> {
    let expr = CheckExpr::parse(&constraint.param)?;
    for field in expr.fields() {
        table.require_field(field)?;
    }
    if constraint.is_table_level() && expr.fields().is_empty() {
        return Err(DbError::invalid_expression(
            &constraint.param,
            "a table-level CHECK must name its fields",
        ));
    }
    Ok(())
}

/// Fills generated values and validates a row about to be inserted.
///
/// # Arguments
/// * `tables` - Every table, for foreign key and uniqueness lookups
/// * `table_name` - Target table
/// * `values` - Candidate row; DEFAULT and AUTO_INCREMENT write into it
///
/// # Returns
/// `Err(DbError::ConstraintViolation)` naming the first violated constraint.
pub fn check_insert(tables: &Tables, table_name: &str, values: &mut Row) -> Result<(), DbError> {
    let table = lookup(tables, table_name)?;
    for field in &table.fields {
        values.entry(field.name.clone()).or_insert_with(|| NULL.to_string());
    }

    let all_fields: Vec<&str> = table.fields.iter().map(|f| f.name.as_str()).collect();
    apply_generative(table, values, &all_fields, &mut Sequences::default())?;

    let no_exclusions = HashSet::new();
    for constraint in &table.constraints {
        validate(tables, table, constraint, values, &no_exclusions)?;
    }
    Ok(())
}

/// Fills generated values and validates a batch of updated rows.
///
/// Only constraints on the SET columns are checked. Uniqueness ignores the
/// rows' own previous values and also holds within the batch.
///
/// # Arguments
/// * `updates` - `(row_id, merged row)` pairs; generated values are written in place
/// * `set_columns` - Columns assigned by the SET clause
pub fn check_update(
    tables: &Tables,
    table_name: &str,
    updates: &mut [(u64, Row)],
    set_columns: &[String],
) -> Result<(), DbError> {
    let table = lookup(tables, table_name)?;
    let set: Vec<&str> = set_columns.iter().map(String::as_str).collect();
    let mut sequences = Sequences::default();
    for (_, values) in updates.iter_mut() {
        apply_generative(table, values, &set, &mut sequences)?;
    }

    let updated_ids: HashSet<u64> = updates.iter().map(|(id, _)| *id).collect();
    let relevant: Vec<&ConstraintDescriptor> = table
        .constraints
        .iter()
        .filter(|c| !c.kind.is_generative() && touches(c, &set))
        .collect();

    for (_, values) in updates.iter() {
        for constraint in &relevant {
            validate(tables, table, constraint, values, &updated_ids)?;
        }
    }

    // Duplicates introduced inside the batch
    for constraint in &relevant {
        if !matches!(constraint.kind, ConstraintKind::PrimaryKey | ConstraintKind::Unique) {
            continue;
        }
        let kind = table.field_kind(&constraint.field);
        let mut seen: Vec<&str> = Vec::new();
        for (_, values) in updates.iter() {
            let Some(value) = values.get(&constraint.field) else {
                continue;
            };
            if is_null(value) {
                continue;
            }
            if seen.iter().any(|s| values_equal(kind, s, value)) {
                return Err(violation(constraint, format!("duplicate value {}", value)));
            }
            seen.push(value);
        }
    }
    Ok(())
}

/// Refuses a delete that would orphan rows referencing the deleted rows.
///
/// Every table's foreign keys pointing at `table_name` are swept; rows being
/// deleted do not count as referencing rows.
pub fn check_delete(
    tables: &Tables,
    table_name: &str,
    deleted: &[(u64, Row)],
) -> Result<(), DbError> {
    if deleted.is_empty() {
        return Ok(());
    }
    let deleted_ids: HashSet<u64> = deleted.iter().map(|(id, _)| *id).collect();
    let no_exclusions = HashSet::new();

    let mut names: Vec<&String> = tables.keys().collect();
    names.sort();
    for name in names {
        let referencing = &tables[name];
        for constraint in &referencing.constraints {
            let Some(target) = constraint.foreign_reference() else {
                continue;
            };
            if target.table != table_name {
                continue;
            }
            let excluded = if name == table_name {
                &deleted_ids
            } else {
                &no_exclusions
            };

            for (_, row) in deleted {
                let Some(value) = row.get(&target.field).filter(|v| !is_null(v)) else {
                    continue;
                };
                let referenced = value_exists(referencing, &constraint.field, value, excluded)
                    .unwrap_or_else(|e| {
                        tracing::warn!(
                            "Reference lookup in '{}' failed, treating as referenced: {}",
                            name,
                            e
                        );
                        true
                    });
                if referenced {
                    return Err(DbError::ReferentialIntegrityViolation {
                        table: table_name.to_string(),
                        constraint: constraint.name.clone(),
                        referencing_table: name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Checks that every existing row satisfies a constraint about to be added.
pub(crate) fn check_existing_rows(
    tables: &Tables,
    table: &Table,
    constraint: &ConstraintDescriptor,
) -> Result<(), DbError> {
    if constraint.kind.is_generative() {
        return Ok(());
    }
    let rows = table.rows()?;
    let kind = table.field_kind(&constraint.field);
    let no_exclusions = HashSet::new();
    let mut seen: Vec<String> = Vec::new();

    for row in &rows {
        match constraint.kind {
            ConstraintKind::PrimaryKey | ConstraintKind::Unique => {
                let value = row.values.get(&constraint.field).map(String::as_str).unwrap_or(NULL);
                if is_null(value) {
                    if constraint.kind == ConstraintKind::PrimaryKey {
                        return Err(violation(constraint, "value is NULL".to_string()));
                    }
                    continue;
                }
                if seen.iter().any(|s| values_equal(kind, s, value)) {
                    return Err(violation(constraint, format!("duplicate value {}", value)));
                }
                seen.push(value.to_string());
            }
            _ => validate(tables, table, constraint, &row.values, &no_exclusions)?,
        }
    }
    Ok(())
}

fn lookup<'a>(tables: &'a Tables, name: &str) -> Result<&'a Table, DbError> {
    tables.get(name).ok_or_else(|| DbError::TableNotFound {
        table: name.to_string(),
    })
}

/// Whether the constraint involves any of the given columns.
fn touches(constraint: &ConstraintDescriptor, columns: &[&str]) -> bool {
    if !constraint.is_table_level() {
        return columns.contains(&constraint.field.as_str());
    }
    match CheckExpr::parse(&constraint.param) {
        Ok(expr) => expr.fields().iter().any(|f| columns.contains(f)),
        Err(_) => true,
    }
}

/// Last AUTO_INCREMENT value handed out per field within one mutation.
#[derive(Default)]
struct Sequences {
    last: HashMap<String, i64>,
}

impl Sequences {
    fn next(&mut self, table: &Table, field: &str) -> Result<i64, DbError> {
        let next = match self.last.get(field) {
            Some(last) => last + 1,
            None => max_int_value(table, field)? + 1,
        };
        self.last.insert(field.to_string(), next);
        Ok(next)
    }
}

fn apply_generative(
    table: &Table,
    values: &mut Row,
    columns: &[&str],
    sequences: &mut Sequences,
) -> Result<(), DbError> {
    for constraint in table.constraints.iter().filter(|c| c.kind.is_generative()) {
        if !columns.contains(&constraint.field.as_str()) {
            continue;
        }
        let current = values
            .get(&constraint.field)
            .map(String::as_str)
            .unwrap_or(NULL);

        match constraint.kind {
            ConstraintKind::Default if is_null(current) => {
                values.insert(constraint.field.clone(), constraint.param.clone());
            }
            ConstraintKind::AutoIncrement if is_null(current) => {
                let next = sequences.next(table, &constraint.field)?;
                values.insert(constraint.field.clone(), next.to_string());
            }
            ConstraintKind::AutoIncrement => {
                if current.trim().parse::<i64>().is_err() {
                    return Err(violation(
                        constraint,
                        format!("'{}' is not an integer", current),
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn max_int_value(table: &Table, field: &str) -> Result<i64, DbError> {
    let mut max = 0i64;
    for row in table.store().scan()? {
        let row = row?;
        if let Some(value) = row.values.get(field).filter(|v| !is_null(v)) {
            if let Ok(n) = value.parse::<i64>() {
                max = max.max(n);
            }
        }
    }
    Ok(max)
}

fn validate(
    tables: &Tables,
    table: &Table,
    constraint: &ConstraintDescriptor,
    values: &Row,
    excluded: &HashSet<u64>,
) -> Result<(), DbError> {
    let value = values
        .get(&constraint.field)
        .map(String::as_str)
        .unwrap_or(NULL);

    match constraint.kind {
        ConstraintKind::PrimaryKey | ConstraintKind::Unique => {
            if is_null(value) {
                if constraint.kind == ConstraintKind::PrimaryKey {
                    return Err(violation(constraint, "value is NULL".to_string()));
                }
                return Ok(());
            }
            let duplicate = value_exists(table, &constraint.field, value, excluded)
                .unwrap_or_else(|e| {
                    tracing::warn!("Uniqueness lookup for '{}' failed: {}", constraint.name, e);
                    true
                });
            if duplicate {
                return Err(violation(constraint, format!("duplicate value {}", value)));
            }
        }
        ConstraintKind::ForeignKey => {
            if is_null(value) {
                return Ok(());
            }
            let found = constraint
                .foreign_reference()
                .and_then(|target| {
                    let referenced = tables.get(&target.table)?;
                    value_exists(referenced, &target.field, value, &HashSet::new())
                        .map_err(|e| {
                            tracing::warn!(
                                "Foreign key lookup for '{}' failed: {}",
                                constraint.name,
                                e
                            )
                        })
                        .ok()
                })
                .unwrap_or(false);
            if !found {
                return Err(violation(
                    constraint,
                    format!("no row in {} has value {}", constraint.param, value),
                ));
            }
        }
        ConstraintKind::Check => {
            let expr = CheckExpr::parse(&constraint.param)?;
            let default_field = (!constraint.is_table_level()).then_some(constraint.field.as_str());
            let satisfied = expr.evaluate(values, default_field, &|name| table.field_kind(name));
            if !satisfied {
                return Err(violation(
                    constraint,
                    format!("CHECK ({}) failed", constraint.param),
                ));
            }
        }
        ConstraintKind::NotNull => {
            if is_null(value) {
                return Err(violation(constraint, "value is NULL".to_string()));
            }
        }
        ConstraintKind::Default | ConstraintKind::AutoIncrement => {}
    }
    Ok(())
}

/// Whether a live row outside `excluded` has `field == value`.
///
/// Uses a single-column index on the field when one exists.
fn value_exists(
    table: &Table,
    field: &str,
    value: &str,
    excluded: &HashSet<u64>,
) -> Result<bool, DbError> {
    let kind = table.require_field(field)?.kind;

    if let Some(candidates) = table
        .index_on(field)
        .and_then(|index| index.lookup(CompareOp::Eq, value))
    {
        let candidates: HashSet<u64> = candidates.difference(excluded).copied().collect();
        if candidates.is_empty() {
            return Ok(false);
        }
        for row in table.store().scan_ids(&candidates)? {
            let row = row?;
            if row.values.get(field).is_some_and(|v| values_equal(Some(kind), v, value)) {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    for row in table.store().scan()? {
        let row = row?;
        if excluded.contains(&row.row_id) {
            continue;
        }
        if row.values.get(field).is_some_and(|v| values_equal(Some(kind), v, value)) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn violation(constraint: &ConstraintDescriptor, reason: String) -> DbError {
    DbError::ConstraintViolation {
        name: constraint.name.clone(),
        field: constraint.field.clone(),
        reason,
    }
}
