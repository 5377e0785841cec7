//! Row-level undo primitives for a transaction manager.
//!
//! These bypass the constraint engine and the mutation log: they restore a
//! state that was valid before the logged mutation.

use crate::error::DbError;
use crate::storage::StoredRow;
use crate::table::Table;

use super::dml::canonicalize;
use super::Database;

impl Database {
    /// Undoes an insert by marking the row deleted.
    ///
    /// # Returns
    /// `Err(DbError::RowNotFound)` when no live row has that id.
    pub fn rollback_insert_by_rowid(&mut self, table: &str, row_id: u64) -> Result<(), DbError> {
        let row = find_row(self.table(table)?, row_id)?
            .filter(|row| !row.deleted)
            .ok_or_else(|| not_found(table, row_id))?;

        let target = self.table_mut(table)?;
        target.store_mut().set_deleted_flag(row_id, true)?;
        target.index_remove(row_id, &row.values);
        tracing::debug!("Rolled back insert of row {} in '{}'", row_id, table);
        self.finish_mutation(table)
    }

    /// Undoes a delete by clearing the row's delete flag.
    ///
    /// A row that is already live is left as is.
    ///
    /// # Returns
    /// `Err(DbError::RowNotFound)` when the file holds no row with that id,
    /// e.g. after compaction removed it.
    pub fn rollback_delete_by_rowid(&mut self, table: &str, row_id: u64) -> Result<(), DbError> {
        let row = find_row(self.table(table)?, row_id)?.ok_or_else(|| not_found(table, row_id))?;
        if !row.deleted {
            return Ok(());
        }

        let target = self.table_mut(table)?;
        target.store_mut().set_deleted_flag(row_id, false)?;
        target.index_insert(row_id, &row.values);
        tracing::debug!("Rolled back delete of row {} in '{}'", row_id, table);
        self.finish_mutation(table)
    }

    /// Undoes an update by writing the given column values back into the row.
    ///
    /// # Arguments
    /// * `values` - `(column, previous value)` pairs
    pub fn rollback_update_by_rowid(
        &mut self,
        table: &str,
        row_id: u64,
        values: &[(&str, &str)],
    ) -> Result<(), DbError> {
        let target = self.table(table)?;
        let old = find_row(target, row_id)?
            .filter(|row| !row.deleted)
            .ok_or_else(|| not_found(table, row_id))?
            .values;

        let mut restored = old.clone();
        for (column, value) in values {
            target.require_field(column)?;
            restored.insert(column.to_string(), value.to_string());
        }
        canonicalize(&target.fields, &mut restored, self.config.strict_varchar)?;

        let target = self.table_mut(table)?;
        target.store_mut().overwrite(row_id, &restored)?;
        target.index_update(row_id, &old, &restored);
        tracing::debug!("Rolled back update of row {} in '{}'", row_id, table);
        self.finish_mutation(table)
    }
}

/// The row with `row_id`, tombstone or not.
fn find_row(table: &Table, row_id: u64) -> Result<Option<StoredRow>, DbError> {
    for row in table.store().scan_with_deleted()? {
        let row = row?;
        if row.row_id == row_id {
            return Ok(Some(row));
        }
    }
    Ok(None)
}

fn not_found(table: &str, row_id: u64) -> DbError {
    DbError::RowNotFound {
        table: table.to_string(),
        row_id,
    }
}
