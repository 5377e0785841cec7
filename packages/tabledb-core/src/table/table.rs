//! Table handle.
//!
//! Each table has:
//! - Field and constraint descriptors, mirrored to `.tdf` and `.tic`
//! - A record store over `.trd`
//! - Secondary indexes, each mirrored to a `.tid` file

use std::path::PathBuf;

use crate::config::DbConfig;
use crate::error::DbError;
use crate::index::{IndexDescriptor, SecondaryIndex};
use crate::storage::io_utils::with_suffix;
use crate::storage::{RecordStore, StoredRow};
use crate::types::{FieldKind, Row};

use super::constraint::ConstraintDescriptor;
use super::field::FieldDescriptor;
use super::schema_file;
use super::validation;

/// Table schema, rows and indexes.
#[derive(Debug)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Field definitions in schema order
    pub fields: Vec<FieldDescriptor>,
    /// Declared constraints in evaluation order
    pub constraints: Vec<ConstraintDescriptor>,
    /// Seconds since the epoch of the last mutation
    pub last_modified: i64,
    /// `<data_dir>/<name>`; every table file extends it
    path_prefix: PathBuf,
    /// Backing `.trd` file
    store: RecordStore,
    /// Secondary indexes
    indexes: Vec<SecondaryIndex>,
}

impl Table {
    /// Creates a new table and its schema and row files.
    ///
    /// # Arguments
    /// * `config` - Database configuration
    /// * `name` - Table name
    /// * `fields` - Field definitions; `order` is reassigned from position
    /// * `constraints` - Constraint declarations
    ///
    /// # Returns
    /// `Result<Table, DbError>` containing the created table or an error.
    pub(crate) fn create(
        config: &DbConfig,
        name: &str,
        mut fields: Vec<FieldDescriptor>,
        constraints: Vec<ConstraintDescriptor>,
    ) -> Result<Self, DbError> {
        validation::validate_object_name(name)?;
        for (order, field) in fields.iter_mut().enumerate() {
            field.order = order as i32;
        }
        validation::validate_fields(name, &fields)?;
        validation::validate_constraints(name, &fields, &constraints)?;

        let path_prefix = config.table_path_prefix(name);
        schema_file::write_fields(&with_suffix(&path_prefix, "tdf"), &fields)?;
        schema_file::write_constraints(&with_suffix(&path_prefix, "tic"), &constraints)?;
        let store = RecordStore::create(
            with_suffix(&path_prefix, "trd"),
            &fields,
            config.strict_varchar,
            config.sync_writes,
        )?;

        Ok(Self {
            name: name.to_string(),
            fields,
            constraints,
            last_modified: chrono::Utc::now().timestamp(),
            path_prefix,
            store,
            indexes: Vec::new(),
        })
    }

    /// Opens an existing table from its schema and row files. Indexes are
    /// attached separately.
    pub(crate) fn open(config: &DbConfig, name: &str, last_modified: i64) -> Result<Self, DbError> {
        let path_prefix = config.table_path_prefix(name);
        let mut fields = schema_file::read_fields(&with_suffix(&path_prefix, "tdf"))?;
        fields.sort_by_key(|f| f.order);
        let constraints = schema_file::read_constraints(&with_suffix(&path_prefix, "tic"))?;
        let store = RecordStore::open(
            with_suffix(&path_prefix, "trd"),
            &fields,
            config.strict_varchar,
            config.sync_writes,
        )?;

        tracing::debug!(
            "Opened table '{}' with {} fields and {} constraints",
            name,
            fields.len(),
            constraints.len()
        );
        Ok(Self {
            name: name.to_string(),
            fields,
            constraints,
            last_modified,
            path_prefix,
            store,
            indexes: Vec::new(),
        })
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.field(name).map(|f| f.kind)
    }

    /// Looks up a field by name, failing with `FieldNotFound`.
    pub fn require_field(&self, name: &str) -> Result<&FieldDescriptor, DbError> {
        self.field(name).ok_or_else(|| DbError::FieldNotFound {
            table: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut RecordStore {
        &mut self.store
    }

    /// All live rows in file order.
    pub fn rows(&self) -> Result<Vec<StoredRow>, DbError> {
        self.store.scan()?.collect()
    }

    /// Every row, tombstones included.
    pub fn rows_with_deleted(&self) -> Result<Vec<StoredRow>, DbError> {
        self.store.scan_with_deleted()?.collect()
    }

    pub fn row_count(&self) -> Result<usize, DbError> {
        self.store.live_count()
    }

    pub fn indexes(&self) -> &[SecondaryIndex] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&SecondaryIndex> {
        self.indexes.iter().find(|i| i.name() == name)
    }

    /// Single-column index on `field`, if any.
    pub fn index_on(&self, field: &str) -> Option<&SecondaryIndex> {
        self.indexes.iter().find(|i| i.covers(field))
    }

    /// Path of one of the table's files, e.g. `file_path("trd")`.
    pub fn file_path(&self, extension: &str) -> PathBuf {
        with_suffix(&self.path_prefix, extension)
    }

    /// `.tid` path of the named index.
    pub fn index_path(&self, index: &str) -> PathBuf {
        with_suffix(&self.path_prefix, &format!("{}.tid", index))
    }

    /// Records a mutation.
    pub(crate) fn touch(&mut self) {
        self.last_modified = chrono::Utc::now().timestamp();
    }

    /// Rewrites `.tdf` and `.tic` from the in-memory descriptors.
    pub(crate) fn save_schema(&self) -> Result<(), DbError> {
        schema_file::write_fields(&self.file_path("tdf"), &self.fields)?;
        schema_file::write_constraints(&self.file_path("tic"), &self.constraints)
    }

    /// Builds an index from the current rows.
    pub(crate) fn build_index(&self, descriptor: IndexDescriptor) -> Result<SecondaryIndex, DbError> {
        let path = self.index_path(&descriptor.name);
        SecondaryIndex::build(descriptor, &self.fields, path, self.store.scan()?)
    }

    /// Loads an index from its `.tid` file.
    pub(crate) fn load_index(&self, descriptor: IndexDescriptor) -> Result<SecondaryIndex, DbError> {
        let path = self.index_path(&descriptor.name);
        SecondaryIndex::load(descriptor, &self.fields, path)
    }

    pub(crate) fn attach_index(&mut self, index: SecondaryIndex) {
        self.indexes.push(index);
    }

    pub(crate) fn detach_index(&mut self, name: &str) -> Option<SecondaryIndex> {
        let pos = self.indexes.iter().position(|i| i.name() == name)?;
        Some(self.indexes.remove(pos))
    }

    /// Adds a new row to every index.
    pub(crate) fn index_insert(&mut self, row_id: u64, values: &Row) {
        for index in &mut self.indexes {
            index.insert_row(row_id, values);
        }
    }

    /// Removes a row from every index.
    pub(crate) fn index_remove(&mut self, row_id: u64, values: &Row) {
        for index in &mut self.indexes {
            index.remove_row(row_id, values);
        }
    }

    /// Moves a rewritten row within every index whose value changed.
    pub(crate) fn index_update(&mut self, row_id: u64, old: &Row, new: &Row) {
        for index in &mut self.indexes {
            index.update_row(row_id, old, new);
        }
    }

    /// Rebuilds every index from the live rows, e.g. after a schema change.
    pub(crate) fn rebuild_indexes(&mut self) -> Result<(), DbError> {
        let descriptors: Vec<IndexDescriptor> =
            self.indexes.iter().map(|i| i.descriptor().clone()).collect();
        let mut rebuilt = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            rebuilt.push(self.build_index(descriptor)?);
        }
        self.indexes = rebuilt;
        tracing::debug!("Rebuilt {} indexes of table '{}'", self.indexes.len(), self.name);
        Ok(())
    }

    /// Writes every index to its `.tid` file.
    pub(crate) fn save_indexes(&self) -> Result<(), DbError> {
        for index in &self.indexes {
            index.save()?;
        }
        Ok(())
    }

    /// Writes the indexes changed since they were last saved.
    ///
    /// # Returns
    /// How many `.tid` files were written.
    pub(crate) fn save_changed_indexes(&mut self) -> Result<usize, DbError> {
        let mut written = 0;
        for index in &mut self.indexes {
            if index.save_if_changed()? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Renames a field inside index descriptors.
    pub(crate) fn rename_index_field(&mut self, old: &str, new: &str) {
        for index in &mut self.indexes {
            index.rename_field(old, new);
        }
    }

    /// Deletes the table's files and index files.
    pub(crate) fn remove_files(&self) -> Result<(), DbError> {
        for index in &self.indexes {
            index.remove_file();
        }
        self.store.remove_file()?;
        for extension in ["tdf", "tic"] {
            let path = self.file_path(extension);
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(crate::storage::io_utils::classify_io_error(
                        e,
                        &format!("Failed to remove {}", path.display()),
                    ));
                }
            }
        }
        Ok(())
    }
}
