//! Table, index, field and constraint management.

use crate::constraints::{check_existing_rows, validate_check, CheckExpr};
use crate::error::DbError;
use crate::index::IndexDescriptor;
use crate::table::schema_file::MAX_PARAM_LEN;
use crate::table::validation::{validate_constraint, validate_field, validate_fields, validate_object_name};
use crate::table::{ConstraintDescriptor, ConstraintKind, FieldDescriptor, Table};
use crate::types::NULL;

use super::dml::canonicalize;
use super::Database;

impl Database {
    /// Creates a table with its `.tdf`, `.tic` and empty `.trd` files.
    ///
    /// # Returns
    /// `Err(DbError::TableAlreadyExists)` for a duplicate name, or a schema
    /// error when a field, constraint, CHECK expression or foreign key target
    /// is invalid.
    pub fn create_table(
        &mut self,
        name: &str,
        fields: Vec<FieldDescriptor>,
        constraints: Vec<ConstraintDescriptor>,
    ) -> Result<(), DbError> {
        if self.tables.contains_key(name) {
            return Err(DbError::TableAlreadyExists(name.to_string()));
        }

        let table = Table::create(&self.config, name, fields, constraints)?;
        let checked = table
            .constraints
            .iter()
            .try_for_each(|constraint| self.validate_declaration(&table, constraint));
        if let Err(err) = checked {
            table.remove_files()?;
            return Err(err);
        }

        tracing::info!(
            "Created table '{}' with {} fields and {} constraints",
            name,
            table.fields.len(),
            table.constraints.len()
        );
        self.tables.insert(name.to_string(), table);
        self.save_catalog()
    }

    /// Drops a table, its files and its indexes.
    ///
    /// # Returns
    /// `Err(DbError::ReferentialIntegrityViolation)` while another table has a
    /// foreign key into it.
    pub fn drop_table(&mut self, name: &str) -> Result<(), DbError> {
        self.table(name)?;
        for (other_name, other) in &self.tables {
            if other_name == name {
                continue;
            }
            if let Some(constraint) = other
                .constraints
                .iter()
                .find(|c| c.foreign_reference().is_some_and(|r| r.table == name))
            {
                return Err(DbError::ReferentialIntegrityViolation {
                    table: name.to_string(),
                    constraint: constraint.name.clone(),
                    referencing_table: other_name.clone(),
                });
            }
        }

        if let Some(table) = self.tables.remove(name) {
            table.remove_files()?;
        }
        tracing::info!("Dropped table '{}'", name);
        self.save_catalog()
    }

    /// Builds an index over one or two fields from the current rows and
    /// writes its `.tid` file.
    pub fn create_index(&mut self, name: &str, table: &str, fields: &[&str]) -> Result<(), DbError> {
        validate_object_name(name)?;
        if self.find_index(name).is_some() {
            return Err(DbError::IndexAlreadyExists(name.to_string()));
        }

        let target = self.table(table)?;
        let mut index = target.build_index(IndexDescriptor::new(name, table, fields))?;
        index.save_if_changed()?;
        tracing::info!(
            "Created index '{}' on {}({}) with {} keys",
            name,
            table,
            fields.join(", "),
            index.tree().len()
        );
        self.table_mut(table)?.attach_index(index);
        self.save_catalog()
    }

    /// Drops an index and deletes its `.tid` file.
    pub fn drop_index(&mut self, name: &str) -> Result<(), DbError> {
        let table = self
            .find_index(name)
            .ok_or_else(|| DbError::IndexNotFound(name.to_string()))?;
        if let Some(index) = self.table_mut(&table)?.detach_index(name) {
            index.remove_file();
        }
        tracing::info!("Dropped index '{}' on '{}'", name, table);
        self.save_catalog()
    }

    /// Appends a field, filling existing rows with `default` (NULL when `None`).
    pub fn add_field(
        &mut self,
        table: &str,
        mut field: FieldDescriptor,
        default: Option<&str>,
    ) -> Result<(), DbError> {
        let strict = self.config.strict_varchar;
        let mode = self.config.rewrite_mode;
        let target = self.table_mut(table)?;
        if target.field(&field.name).is_some() {
            return Err(DbError::FieldAlreadyExists {
                table: table.to_string(),
                field: field.name.clone(),
            });
        }
        field.order = target.fields.len() as i32;
        field.last_modified = chrono::Utc::now().timestamp();
        validate_field(&field)?;

        let mut fields = target.fields.clone();
        fields.push(field.clone());

        let mut default_row = crate::types::Row::new();
        default_row.insert(field.name.clone(), default.unwrap_or(NULL).to_string());
        canonicalize(&fields, &mut default_row, strict)?;
        let fill = default_row.remove(&field.name).unwrap_or_else(|| NULL.to_string());

        target.store_mut().migrate(&fields, mode, |mut row| {
            row.insert(field.name.clone(), fill.clone());
            row
        })?;
        target.fields = fields;
        target.save_schema()?;

        tracing::info!("Added field '{}' to '{}'", field.name, table);
        self.finish_mutation(table)
    }

    /// Removes a field and its field-level constraints and indexes, rewriting
    /// every row without it.
    ///
    /// # Returns
    /// `Err(DbError::InvalidField)` when a table-level CHECK or another
    /// table's foreign key still names the field.
    pub fn drop_field(&mut self, table: &str, field: &str) -> Result<(), DbError> {
        let target = self.table(table)?;
        target.require_field(field)?;
        self.ensure_unreferenced(table, field)?;

        let mode = self.config.rewrite_mode;
        let target = self.table_mut(table)?;
        let fields: Vec<FieldDescriptor> = target
            .fields
            .iter()
            .filter(|f| f.name != field)
            .cloned()
            .enumerate()
            .map(|(order, mut f)| {
                f.order = order as i32;
                f
            })
            .collect();
        validate_fields(table, &fields)?;

        let stale: Vec<String> = target
            .indexes()
            .iter()
            .filter(|index| index.descriptor().fields.iter().any(|f| f == field))
            .map(|index| index.name().to_string())
            .collect();
        for name in &stale {
            if let Some(index) = target.detach_index(name) {
                index.remove_file();
            }
        }

        target.store_mut().migrate(&fields, mode, |mut row| {
            row.remove(field);
            row
        })?;
        target.fields = fields;
        target.constraints.retain(|c| c.field != field);
        target.save_schema()?;

        tracing::info!(
            "Dropped field '{}' from '{}' ({} indexes removed)",
            field,
            table,
            stale.len()
        );
        self.finish_mutation(table)
    }

    /// Renames a field, carrying constraints, CHECK expressions, indexes and
    /// foreign keys that reference it along.
    pub fn rename_field(&mut self, table: &str, old: &str, new: &str) -> Result<(), DbError> {
        let target = self.table(table)?;
        let mut renamed = target.require_field(old)?.clone();
        if target.field(new).is_some() {
            return Err(DbError::FieldAlreadyExists {
                table: table.to_string(),
                field: new.to_string(),
            });
        }
        renamed.name = new.to_string();
        renamed.last_modified = chrono::Utc::now().timestamp();
        validate_field(&renamed)?;
        let checks = renamed_checks(target, old, new)?;

        let mode = self.config.rewrite_mode;
        let target = self.table_mut(table)?;
        let fields: Vec<FieldDescriptor> = target
            .fields
            .iter()
            .map(|f| if f.name == old { renamed.clone() } else { f.clone() })
            .collect();
        target.store_mut().migrate(&fields, mode, |mut row| {
            if let Some(value) = row.remove(old) {
                row.insert(new.to_string(), value);
            }
            row
        })?;
        target.fields = fields;
        for constraint in &mut target.constraints {
            if constraint.field == old {
                constraint.field = new.to_string();
            }
        }
        for (position, param) in checks {
            target.constraints[position].param = param;
        }
        target.rename_index_field(old, new);

        // Foreign keys anywhere, including this table, in either reference form
        let new_reference = format!("{}.{}", table, new);
        let mut referencing: Vec<String> = Vec::new();
        for (name, other) in self.tables.iter_mut() {
            let mut changed = false;
            for constraint in &mut other.constraints {
                let points_here = constraint
                    .foreign_reference()
                    .is_some_and(|target| target.table == table && target.field == old);
                if points_here {
                    constraint.param = new_reference.clone();
                    changed = true;
                }
            }
            if changed && name != table {
                referencing.push(name.clone());
            }
        }

        self.table(table)?.save_schema()?;
        for name in &referencing {
            self.table(name)?.save_schema()?;
        }

        tracing::info!("Renamed field '{}.{}' to '{}'", table, old, new);
        self.finish_mutation(table)
    }

    /// Declares a constraint after checking every existing row against it.
    pub fn add_constraint(&mut self, table: &str, constraint: ConstraintDescriptor) -> Result<(), DbError> {
        let target = self.table(table)?;
        validate_constraint(table, &target.fields, &constraint)?;
        if target.constraints.iter().any(|c| c.name == constraint.name) {
            return Err(DbError::ConstraintAlreadyExists {
                table: table.to_string(),
                name: constraint.name.clone(),
            });
        }
        self.validate_declaration(target, &constraint)?;
        check_existing_rows(&self.tables, target, &constraint)?;

        let target = self.table_mut(table)?;
        tracing::info!(
            "Added {:?} constraint '{}' to '{}'",
            constraint.kind,
            constraint.name,
            table
        );
        target.constraints.push(constraint);
        target.save_schema()?;
        self.finish_mutation(table)
    }

    pub fn drop_constraint(&mut self, table: &str, name: &str) -> Result<(), DbError> {
        let target = self.table_mut(table)?;
        let position = target
            .constraints
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| DbError::ConstraintNotFound {
                table: table.to_string(),
                name: name.to_string(),
            })?;
        target.constraints.remove(position);
        target.save_schema()?;

        tracing::info!("Dropped constraint '{}' from '{}'", name, table);
        self.finish_mutation(table)
    }

    /// Physically removes tombstones from the table file.
    ///
    /// The tombstone with the highest row id is kept when no live row has a
    /// higher id, so ids are never reused after a reopen.
    ///
    /// # Returns
    /// The number of rows removed.
    pub fn compact(&mut self, table: &str) -> Result<usize, DbError> {
        let mode = self.config.rewrite_mode;
        let target = self.table_mut(table)?;
        let rows = target.rows_with_deleted()?;
        let highest = rows.iter().map(|r| r.row_id).max();

        let before = rows.len();
        let kept: Vec<_> = rows
            .into_iter()
            .filter(|row| !row.deleted || Some(row.row_id) == highest)
            .collect();
        let removed = before - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        target.store_mut().rewrite(&kept, mode)?;
        tracing::info!("Compacted '{}': removed {} deleted rows", table, removed);
        self.finish_mutation(table)?;
        Ok(removed)
    }

    /// Rebuilds every index of a table from its live rows and rewrites the
    /// `.tid` files.
    pub fn reindex(&mut self, table: &str) -> Result<(), DbError> {
        self.table_mut(table)?.rebuild_indexes()?;
        tracing::info!("Rebuilt indexes of '{}'", table);
        self.finish_mutation(table)
    }

    /// Table owning the named index.
    fn find_index(&self, name: &str) -> Option<String> {
        self.tables
            .values()
            .find(|table| table.index(name).is_some())
            .map(|table| table.name.clone())
    }

    /// Checks a constraint's references that need other tables or parsing.
    fn validate_declaration(&self, table: &Table, constraint: &ConstraintDescriptor) -> Result<(), DbError> {
        match constraint.kind {
            ConstraintKind::Check => validate_check(table, constraint),
            ConstraintKind::ForeignKey => {
                let Some(target) = constraint.foreign_reference() else {
                    return Err(DbError::invalid_expression(
                        &constraint.param,
                        "foreign key must reference 'table.field'",
                    ));
                };
                let referenced = if target.table == table.name {
                    table
                } else {
                    self.table(&target.table)?
                };
                referenced.require_field(&target.field)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Refuses to drop a field still named by a table-level CHECK or by a
    /// foreign key.
    fn ensure_unreferenced(&self, table: &str, field: &str) -> Result<(), DbError> {
        let target = self.table(table)?;
        if let Some(check) = table_level_checks_naming(target, field).next() {
            return Err(DbError::InvalidField {
                field: field.to_string(),
                reason: format!("named by table-level CHECK '{}'", check.name),
            });
        }
        for (name, other) in &self.tables {
            for constraint in &other.constraints {
                let Some(reference) = constraint.foreign_reference() else {
                    continue;
                };
                if reference.table == table && reference.field == field && !(name == table && constraint.field == field) {
                    return Err(DbError::InvalidField {
                        field: field.to_string(),
                        reason: format!("referenced by foreign key '{}' in '{}'", constraint.name, name),
                    });
                }
            }
        }
        Ok(())
    }
}

/// CHECK expressions of `table` rewritten for a field rename, by constraint
/// position.
///
/// # Returns
/// `Err(DbError::InvalidField)` when a rewritten expression no longer fits a
/// `.tic` record.
fn renamed_checks(table: &Table, old: &str, new: &str) -> Result<Vec<(usize, String)>, DbError> {
    let mut rewritten = Vec::new();
    for (position, constraint) in table.constraints.iter().enumerate() {
        if constraint.kind != ConstraintKind::Check {
            continue;
        }
        let Ok(mut expr) = CheckExpr::parse(&constraint.param) else {
            continue;
        };
        if !expr.rename_field(old, new) {
            continue;
        }
        let param = expr.to_string();
        if param.len() > MAX_PARAM_LEN {
            return Err(DbError::InvalidField {
                field: old.to_string(),
                reason: format!(
                    "CHECK '{}' would exceed {} bytes after the rename",
                    constraint.name, MAX_PARAM_LEN
                ),
            });
        }
        rewritten.push((position, param));
    }
    Ok(rewritten)
}

fn table_level_checks_naming<'a>(
    table: &'a Table,
    field: &'a str,
) -> impl Iterator<Item = &'a ConstraintDescriptor> + 'a {
    table.constraints.iter().filter(move |c| {
        c.is_table_level()
            && CheckExpr::parse(&c.param).is_ok_and(|expr| expr.fields().contains(&field))
    })
}
