//! Database handle: the set of tables in one data directory and every
//! operation that reads or mutates them.
//!
//! Mutations follow one path: the constraint engine validates and augments
//! the row, the record store persists it, indexes are updated and flushed,
//! and finally the mutation log is told.

mod catalog;
mod ddl;
mod dml;
mod rollback;

pub use catalog::{Catalog, TableEntry};

use std::fs;

use crate::config::DbConfig;
use crate::constraints::Tables;
use crate::error::DbError;
use crate::log::{MutationLog, NullLog};
use crate::storage::io_utils::{classify_io_error, retry_io_operation};
use crate::table::Table;

/// Tables of one data directory.
pub struct Database {
    config: DbConfig,
    tables: Tables,
    log: Box<dyn MutationLog>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_dir", &self.config.data_dir)
            .field("tables", &self.table_names())
            .finish()
    }
}

impl Database {
    /// Opens the database in `config.data_dir`, creating the directory if
    /// needed, and restores every catalogued table and index.
    ///
    /// # Returns
    /// `Err(DbError::IndexFileUnavailable)` when a catalogued index has no
    /// `.tid` file.
    pub fn open(config: DbConfig) -> Result<Self, DbError> {
        fs::create_dir_all(&config.data_dir)
            .map_err(|e| classify_io_error(e, "Failed to create data directory"))?;

        let catalog = catalog::load(&config)?;
        let mut tables = Tables::new();
        for entry in catalog.tables {
            let mut table = Table::open(&config, &entry.name, entry.last_modified)?;
            for descriptor in entry.indexes {
                let index = table.load_index(descriptor)?;
                table.attach_index(index);
            }
            tables.insert(entry.name, table);
        }

        tracing::info!(
            "Opened database at {} with {} tables",
            config.data_dir.display(),
            tables.len()
        );
        Ok(Self {
            config,
            tables,
            log: Box::new(NullLog),
        })
    }

    /// Replaces the mutation log.
    pub fn with_log(mut self, log: impl MutationLog + 'static) -> Self {
        self.log = Box::new(log);
        self
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn table(&self, name: &str) -> Result<&Table, DbError> {
        crate::query::lookup(&self.tables, name)
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Table names in ascending order.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Flushes every index and the catalog.
    pub fn sync(&self) -> Result<(), DbError> {
        for table in self.tables.values() {
            self.save_indexes(table)?;
        }
        self.save_catalog()
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, DbError> {
        self.tables.get_mut(name).ok_or_else(|| DbError::TableNotFound {
            table: name.to_string(),
        })
    }

    fn save_indexes(&self, table: &Table) -> Result<(), DbError> {
        retry_io_operation(
            || table.save_indexes(),
            self.config.persistence_max_retries,
            self.config.persistence_retry_delay_ms,
            "save_indexes",
        )
    }

    fn save_catalog(&self) -> Result<(), DbError> {
        let tables = self
            .table_names()
            .into_iter()
            .filter_map(|name| self.tables.get(&name))
            .map(|table| TableEntry {
                name: table.name.clone(),
                last_modified: table.last_modified,
                indexes: table
                    .indexes()
                    .iter()
                    .map(|index| index.descriptor().clone())
                    .collect(),
            })
            .collect();
        catalog::save(&self.config, &Catalog::new(tables))
    }

    /// Stamps the table as modified, writes the indexes the mutation changed
    /// and records the new timestamp in the catalog.
    fn finish_mutation(&mut self, name: &str) -> Result<(), DbError> {
        let max_retries = self.config.persistence_max_retries;
        let retry_delay_ms = self.config.persistence_retry_delay_ms;
        let table = self.table_mut(name)?;
        table.touch();
        let written = retry_io_operation(
            || table.save_changed_indexes(),
            max_retries,
            retry_delay_ms,
            "save_changed_indexes",
        )?;
        tracing::debug!("Wrote {} index files of '{}'", written, name);
        self.save_catalog()
    }
}
