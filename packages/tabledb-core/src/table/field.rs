//! Field definition within a table.

use serde::{Deserialize, Serialize};

use crate::types::FieldKind;

/// Longest field or constraint name accepted, in bytes.
pub const MAX_NAME_LEN: usize = 127;

/// Field definition within a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Position in the schema (0-based)
    pub order: i32,
    /// Field name
    pub name: String,
    /// Storage type
    pub kind: FieldKind,
    /// Width in bytes for Varchar, unused otherwise
    pub param: usize,
    /// Seconds since the epoch of the last schema change to this field
    pub last_modified: i64,
    /// Integrity flag carried through from the schema file
    pub integrity_flag: i32,
}

impl FieldDescriptor {
    /// Creates a new field with the given parameters.
    ///
    /// # Arguments
    /// * `name` - Field name
    /// * `kind` - Storage type
    /// * `param` - Width in bytes for Varchar, ignored otherwise
    ///
    /// # Returns
    /// A new FieldDescriptor; `order` is assigned when added to a table.
    pub fn new(name: impl Into<String>, kind: FieldKind, param: usize) -> Self {
        Self {
            order: 0,
            name: name.into(),
            kind,
            param: if kind == FieldKind::Varchar { param } else { 0 },
            last_modified: chrono::Utc::now().timestamp(),
            integrity_flag: 0,
        }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Int, 0)
    }

    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Double, 0)
    }

    pub fn varchar(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, FieldKind::Varchar, len)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool, 0)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime, 0)
    }

    /// Parses `name TYPE`, e.g. `"title VARCHAR(40)"`.
    pub fn parse(definition: &str) -> Result<Self, crate::error::DbError> {
        let definition = definition.trim();
        let (name, type_name) = definition.split_once(char::is_whitespace).ok_or_else(|| {
            crate::error::DbError::invalid_expression(definition, "expected '<name> <type>'")
        })?;
        let (kind, param) = FieldKind::parse(type_name)?;
        Ok(Self::new(name, kind, param))
    }

    /// Payload size in bytes.
    pub fn data_size(&self) -> usize {
        self.kind.data_size(self.param)
    }
}
