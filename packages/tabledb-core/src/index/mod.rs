//! Secondary B-tree indexes over one or two table fields.

mod btree;
mod key;
mod node;
pub mod persist;

pub use btree::BTree;
pub use key::{split_suffix, stored_key, ComponentOrder, KeyOrder, COMPONENT_SEP, ROW_ID_SEP};
pub use node::{BTreeNode, FieldPointer, DEGREE, MAX_KEYS, MIN_KEYS};

use std::collections::HashSet;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::{decode_field, encode_field_into, slot_size};
use crate::error::DbError;
use crate::expr::CompareOp;
use crate::storage::{RecordPointer, StoredRow};
use crate::table::FieldDescriptor;
use crate::types::{is_null, Row};

/// Most fields a composite index may cover.
pub const MAX_INDEX_FIELDS: usize = 2;

/// Declared index, as recorded in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Index name, unique within its table
    pub name: String,
    /// Indexed table
    pub table: String,
    /// Indexed fields in key order
    pub fields: Vec<String>,
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>, table: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn is_single_column(&self) -> bool {
        self.fields.len() == 1
    }
}

/// A B-tree kept in step with one table and mirrored to a `.tid` file.
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    descriptor: IndexDescriptor,
    /// Descriptors of the indexed fields, in key order
    fields: Vec<FieldDescriptor>,
    tree: BTree,
    path: PathBuf,
    /// Tree differs from the `.tid` file
    unsaved: bool,
}

impl SecondaryIndex {
    /// Builds an index by replaying every live row.
    pub fn build<I>(
        descriptor: IndexDescriptor,
        table_fields: &[FieldDescriptor],
        path: PathBuf,
        rows: I,
    ) -> Result<Self, DbError>
    where
        I: IntoIterator<Item = Result<StoredRow, DbError>>,
    {
        let fields = resolve_fields(&descriptor, table_fields)?;
        let mut index = Self {
            tree: BTree::new(key_order(&fields)),
            descriptor,
            fields,
            path,
            unsaved: true,
        };
        for row in rows {
            let row = row?;
            index.insert_row(row.row_id, &row.values);
        }
        tracing::debug!(
            "Built index '{}' on {}({}) with {} keys",
            index.descriptor.name,
            index.descriptor.table,
            index.descriptor.fields.join(", "),
            index.tree.len()
        );
        Ok(index)
    }

    /// Loads an index from its `.tid` file.
    ///
    /// # Returns
    /// `Err(DbError::IndexFileUnavailable)` when the file is missing, or
    /// `Err(DbError::CorruptRecord)` when it does not decode to a valid tree for
    /// these fields.
    pub fn load(
        descriptor: IndexDescriptor,
        table_fields: &[FieldDescriptor],
        path: PathBuf,
    ) -> Result<Self, DbError> {
        let fields = resolve_fields(&descriptor, table_fields)?;
        let tree = persist::load_tree(&path)?;
        if *tree.order() != key_order(&fields) {
            return Err(DbError::corrupt(
                path.display().to_string(),
                "key order does not match the indexed fields",
            ));
        }
        Ok(Self {
            descriptor,
            fields,
            tree,
            path,
            unsaved: false,
        })
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn tree(&self) -> &BTree {
        &self.tree
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this is a single-column index on `field`.
    pub fn covers(&self, field: &str) -> bool {
        self.descriptor.is_single_column() && self.descriptor.fields[0] == field
    }

    pub fn save(&self) -> Result<(), DbError> {
        persist::save_tree(&self.tree, &self.path)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    /// Writes the `.tid` file only when the tree changed since the last
    /// save or load.
    ///
    /// # Returns
    /// Whether the file was written.
    pub fn save_if_changed(&mut self) -> Result<bool, DbError> {
        if !self.unsaved {
            return Ok(false);
        }
        self.save()?;
        self.unsaved = false;
        Ok(true)
    }

    /// Deletes the `.tid` file; failures are logged, not returned.
    pub fn remove_file(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "Failed to remove index file {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }

    /// Indexed value of a row: the field values joined by [`COMPONENT_SEP`],
    /// or `None` when any of them is NULL.
    pub fn value_of(&self, values: &Row) -> Option<String> {
        let mut parts = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = values.get(&field.name)?;
            if is_null(value) {
                return None;
            }
            parts.push(value.as_str());
        }
        Some(parts.join(&COMPONENT_SEP.to_string()))
    }

    pub fn insert_row(&mut self, row_id: u64, values: &Row) {
        if let Some(value) = self.value_of(values) {
            self.tree
                .insert(stored_key(&value, row_id), RecordPointer { row_id });
            self.unsaved = true;
        }
    }

    pub fn remove_row(&mut self, row_id: u64, values: &Row) {
        if let Some(value) = self.value_of(values) {
            if self.tree.remove(&stored_key(&value, row_id)).is_some() {
                self.unsaved = true;
            }
        }
    }

    /// Moves a row to its new indexed value; a no-op when that value is
    /// unchanged.
    pub fn update_row(&mut self, row_id: u64, old: &Row, new: &Row) {
        if self.value_of(old) == self.value_of(new) {
            return;
        }
        self.remove_row(row_id, old);
        self.insert_row(row_id, new);
    }

    /// Row ids whose indexed value equals `value`.
    pub fn find(&self, value: &str) -> Vec<RecordPointer> {
        self.find_range(value, value)
            .into_iter()
            .map(|entry| entry.pointer)
            .collect()
    }

    /// Entries whose value lies in `[low, high]`, ascending.
    pub fn find_range(&self, low: &str, high: &str) -> Vec<FieldPointer> {
        let low = stored_key(low, 0);
        let high = stored_key(high, u64::MAX);
        self.tree
            .range(Bound::Included(low.as_str()), Bound::Included(high.as_str()))
    }

    /// Candidate row ids for `field OP literal` on a single-column index.
    ///
    /// # Returns
    /// `None` when the index cannot answer: `!=`, a NULL literal, or a literal
    /// that does not encode as the field's kind.
    pub fn lookup(&self, op: CompareOp, literal: &str) -> Option<HashSet<u64>> {
        let field = self.fields.first()?;
        if self.fields.len() != 1 || op == CompareOp::Ne || is_null(literal) {
            return None;
        }
        let value = canonical_value(field, literal)?;
        let at_least = stored_key(&value, 0);
        let at_most = stored_key(&value, u64::MAX);

        let (low, high) = match op {
            CompareOp::Eq => (Bound::Included(at_least.as_str()), Bound::Included(at_most.as_str())),
            CompareOp::Lt => (Bound::Unbounded, Bound::Excluded(at_least.as_str())),
            CompareOp::Le => (Bound::Unbounded, Bound::Included(at_most.as_str())),
            CompareOp::Gt => (Bound::Excluded(at_most.as_str()), Bound::Unbounded),
            CompareOp::Ge => (Bound::Included(at_least.as_str()), Bound::Unbounded),
            CompareOp::Ne => return None,
        };
        Some(
            self.tree
                .range(low, high)
                .into_iter()
                .map(|entry| entry.pointer.row_id)
                .collect(),
        )
    }

    /// Follows a field rename; the key order is unchanged.
    pub(crate) fn rename_field(&mut self, old: &str, new: &str) {
        for name in &mut self.descriptor.fields {
            if name == old {
                *name = new.to_string();
            }
        }
        for field in &mut self.fields {
            if field.name == old {
                field.name = new.to_string();
            }
        }
    }
}

fn resolve_fields(
    descriptor: &IndexDescriptor,
    table_fields: &[FieldDescriptor],
) -> Result<Vec<FieldDescriptor>, DbError> {
    if descriptor.fields.is_empty() || descriptor.fields.len() > MAX_INDEX_FIELDS {
        return Err(DbError::InvalidField {
            field: descriptor.name.clone(),
            reason: format!("an index covers 1 to {} fields", MAX_INDEX_FIELDS),
        });
    }
    descriptor
        .fields
        .iter()
        .map(|name| {
            table_fields
                .iter()
                .find(|f| &f.name == name)
                .cloned()
                .ok_or_else(|| DbError::FieldNotFound {
                    table: descriptor.table.clone(),
                    field: name.clone(),
                })
        })
        .collect()
}

fn key_order(fields: &[FieldDescriptor]) -> KeyOrder {
    KeyOrder::new(
        fields
            .iter()
            .map(|f| ComponentOrder::for_kind(f.kind))
            .collect(),
    )
}

/// A literal in the form the codec would store it: `'5'` becomes `5`, `1`
/// becomes `true` for a Bool field.
fn canonical_value(field: &FieldDescriptor, literal: &str) -> Option<String> {
    let mut slot = Vec::with_capacity(slot_size(field));
    encode_field_into(field, literal, true, &mut slot).ok()?;
    decode_field(field, &slot).ok()
}
