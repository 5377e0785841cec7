//! INSERT, SELECT, UPDATE and DELETE.

use std::collections::{HashMap, HashSet};

use crate::codec::{decode_field, encode_field_into};
use crate::constraints::{check_delete, check_insert, check_update};
use crate::error::DbError;
use crate::expr::{CompareOp, Token, TokenStream};
use crate::query::{self, filter_table, Condition, QueryResult, SelectQuery};
use crate::storage::{RecordPointer, StoredRow};
use crate::table::{FieldDescriptor, Table};
use crate::types::{unquote, Row};

use super::Database;

impl Database {
    /// Inserts one row.
    ///
    /// # Arguments
    /// * `table` - Target table
    /// * `columns` - Columns the values are for; `None` means every field in schema order
    /// * `values` - Literal values; omitted columns start as NULL
    ///
    /// # Returns
    /// The new row's pointer, or `Err(DbError::ConstraintViolation)` naming the
    /// first violated constraint; nothing is written in that case.
    pub fn insert(
        &mut self,
        table: &str,
        columns: Option<&[&str]>,
        values: &[&str],
    ) -> Result<RecordPointer, DbError> {
        let target = self.table(table)?;
        let mut row = bind_values(target, columns, values)?;
        canonicalize(&target.fields, &mut row, self.config.strict_varchar)?;
        check_insert(&self.tables, table, &mut row)?;
        canonicalize(&target.fields, &mut row, self.config.strict_varchar)?;

        let target = self.table_mut(table)?;
        let pointer = target.store_mut().append(&row)?;
        target.index_insert(pointer.row_id, &row);
        self.finish_mutation(table)?;

        tracing::debug!("Inserted row {} into '{}'", pointer.row_id, table);
        self.log.log_insert(table, pointer.row_id, &row);
        Ok(pointer)
    }

    /// Runs a query over the current tables.
    pub fn select(&self, query: &SelectQuery) -> Result<QueryResult, DbError> {
        query::execute(&self.tables, query)
    }

    /// Applies `set_clause` (`col = value, ...`) to every live row matching
    /// `condition` (all rows when `None`).
    ///
    /// # Returns
    /// The number of updated rows. With no match the table file is not touched.
    pub fn update(
        &mut self,
        table: &str,
        set_clause: &str,
        condition: Option<&str>,
    ) -> Result<usize, DbError> {
        let target = self.table(table)?;
        let assignments = parse_assignments(set_clause)?;
        for (column, _) in &assignments {
            target.require_field(column)?;
        }
        let condition = condition.map(Condition::parse).transpose()?;
        let matched = filter_table(target, condition.as_ref())?;
        if matched.is_empty() {
            return Ok(0);
        }

        let set_columns: Vec<String> = assignments.iter().map(|(c, _)| c.clone()).collect();
        let mut old_values: HashMap<u64, Row> = HashMap::with_capacity(matched.len());
        let mut updates: Vec<(u64, Row)> = Vec::with_capacity(matched.len());
        for row in matched {
            let mut values = row.values.clone();
            for (column, value) in &assignments {
                values.insert(column.clone(), value.clone());
            }
            canonicalize(&target.fields, &mut values, self.config.strict_varchar)?;
            old_values.insert(row.row_id, row.values);
            updates.push((row.row_id, values));
        }
        check_update(&self.tables, table, &mut updates, &set_columns)?;
        for (_, values) in &mut updates {
            canonicalize(&target.fields, values, self.config.strict_varchar)?;
        }

        let mut new_values: HashMap<u64, Row> = updates.into_iter().collect();
        let rows: Vec<StoredRow> = target
            .rows_with_deleted()?
            .into_iter()
            .map(|mut row| {
                if let Some(values) = new_values.get(&row.row_id) {
                    row.values = values.clone();
                }
                row
            })
            .collect();

        let mode = self.config.rewrite_mode;
        let target = self.table_mut(table)?;
        target.store_mut().rewrite(&rows, mode)?;
        let mut ids: Vec<u64> = new_values.keys().copied().collect();
        ids.sort_unstable();
        for row_id in &ids {
            if let (Some(old), Some(new)) = (old_values.get(row_id), new_values.get(row_id)) {
                target.index_update(*row_id, old, new);
            }
        }
        self.finish_mutation(table)?;

        tracing::debug!("Updated {} rows in '{}'", ids.len(), table);
        for row_id in &ids {
            if let (Some(old), Some(new)) = (old_values.get(row_id), new_values.remove(row_id)) {
                self.log.log_update(table, *row_id, old, &new);
            }
        }
        Ok(ids.len())
    }

    /// Marks every live row matching `condition` (all rows when `None`) as
    /// deleted.
    ///
    /// # Returns
    /// The number of deleted rows, or `Err(DbError::ReferentialIntegrityViolation)`
    /// when another row still references one of them. With no match the table
    /// file is not touched.
    pub fn delete(&mut self, table: &str, condition: Option<&str>) -> Result<usize, DbError> {
        let target = self.table(table)?;
        let condition = condition.map(Condition::parse).transpose()?;
        let matched = filter_table(target, condition.as_ref())?;
        if matched.is_empty() {
            return Ok(0);
        }

        let deleted: Vec<(u64, Row)> = matched
            .into_iter()
            .map(|row| (row.row_id, row.values))
            .collect();
        check_delete(&self.tables, table, &deleted)?;

        let ids: HashSet<u64> = deleted.iter().map(|(id, _)| *id).collect();
        let rows: Vec<StoredRow> = target
            .rows_with_deleted()?
            .into_iter()
            .map(|mut row| {
                row.deleted |= ids.contains(&row.row_id);
                row
            })
            .collect();

        let mode = self.config.rewrite_mode;
        let target = self.table_mut(table)?;
        target.store_mut().rewrite(&rows, mode)?;
        for (row_id, values) in &deleted {
            target.index_remove(*row_id, values);
        }
        self.finish_mutation(table)?;

        tracing::debug!("Deleted {} rows from '{}'", deleted.len(), table);
        for (row_id, values) in &deleted {
            self.log.log_delete(table, *row_id, values);
        }
        Ok(deleted.len())
    }
}

/// Pairs values with their columns.
fn bind_values(table: &Table, columns: Option<&[&str]>, values: &[&str]) -> Result<Row, DbError> {
    let columns: Vec<&str> = match columns {
        Some(columns) => columns.to_vec(),
        None => table.fields.iter().map(|f| f.name.as_str()).collect(),
    };
    if columns.len() != values.len() {
        return Err(DbError::invalid_expression(
            &values.join(", "),
            format!("{} values for {} columns", values.len(), columns.len()),
        ));
    }

    let mut row = Row::new();
    for (column, value) in columns.into_iter().zip(values) {
        table.require_field(column)?;
        if row
            .insert(column.to_string(), unquote(value.trim()).to_string())
            .is_some()
        {
            return Err(DbError::invalid_expression(
                column,
                "column listed more than once",
            ));
        }
    }
    Ok(row)
}

/// Replaces each value with the form the codec stores, so constraint checks
/// compare what will actually be on disk.
///
/// # Returns
/// `Err(DbError::TypeMismatch)` when a value does not fit its field.
pub(crate) fn canonicalize(
    fields: &[FieldDescriptor],
    row: &mut Row,
    strict_varchar: bool,
) -> Result<(), DbError> {
    let mut slot = Vec::new();
    for field in fields {
        let Some(value) = row.get_mut(&field.name) else {
            continue;
        };
        slot.clear();
        encode_field_into(field, value, strict_varchar, &mut slot)?;
        *value = decode_field(field, &slot)?;
    }
    Ok(())
}

/// Parses `col = value [, col = value]*`.
pub(crate) fn parse_assignments(source: &str) -> Result<Vec<(String, String)>, DbError> {
    let mut tokens = TokenStream::new(source)?;
    if tokens.is_empty() {
        return Err(tokens.error("empty SET clause"));
    }

    let mut assignments: Vec<(String, String)> = Vec::new();
    loop {
        let column = match tokens.next_token() {
            Some(Token::Ident(name)) => name,
            _ => return Err(tokens.error("expected column name")),
        };
        if tokens.next_token() != Some(Token::Op(CompareOp::Eq)) {
            return Err(tokens.error("expected '='"));
        }
        let value = match tokens.next_token() {
            Some(Token::Number(n)) => n,
            Some(Token::Str(s)) => s,
            Some(Token::Ident(word)) => word,
            _ => return Err(tokens.error("expected value")),
        };
        if assignments.iter().any(|(c, _)| *c == column) {
            return Err(tokens.error(format!("column '{}' assigned twice", column)));
        }
        assignments.push((column, value));
        if !tokens.eat(&Token::Comma) {
            break;
        }
    }
    tokens.expect_end()?;
    Ok(assignments)
}
