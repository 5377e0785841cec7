//! Database error types.

use thiserror::Error;

/// Coarse classification of a [`DbError`].
///
/// Callers that need to react to a failure category (retry on I/O, report a
/// violated constraint, rebuild an index) match on this instead of the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Table, field, constraint or index missing; type mismatch; bad expression
    Schema,
    /// A declared constraint rejected the mutation
    ConstraintViolation,
    /// A delete would orphan rows referencing it through a foreign key
    ReferentialIntegrity,
    /// File open/read/write/rename failure
    Io,
    /// Bytes on disk could not be decoded
    CorruptRecord,
    /// Index file missing when loading
    IndexFileUnavailable,
}

/// Database operation errors.
#[derive(Error, Debug, Clone)]
pub enum DbError {
    /// Table not found
    #[error("Table '{table}' not found")]
    TableNotFound { table: String },

    /// Table already exists
    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),

    /// Field not found in table
    #[error("Field '{field}' not found in table '{table}'")]
    FieldNotFound { table: String, field: String },

    /// Field already exists in table
    #[error("Field '{field}' already exists in table '{table}'")]
    FieldAlreadyExists { table: String, field: String },

    /// Field descriptor rejected
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// Constraint not found
    #[error("Constraint '{name}' not found in table '{table}'")]
    ConstraintNotFound { table: String, name: String },

    /// Constraint name already used in the table
    #[error("Constraint '{name}' already exists in table '{table}'")]
    ConstraintAlreadyExists { table: String, name: String },

    /// Index not found
    #[error("Index '{0}' not found")]
    IndexNotFound(String),

    /// Index already exists
    #[error("Index '{0}' already exists")]
    IndexAlreadyExists(String),

    /// Column reference matches several prefixed columns
    #[error("Column '{column}' is ambiguous")]
    AmbiguousColumn { column: String },

    /// Type mismatch error
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    /// Condition, check expression or set clause could not be parsed
    #[error("Invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    /// Row id not present in the record store
    #[error("Row {row_id} not found in table '{table}'")]
    RowNotFound { table: String, row_id: u64 },

    /// A declared constraint rejected the row
    #[error("Constraint '{name}' violated on field '{field}': {reason}")]
    ConstraintViolation {
        name: String,
        field: String,
        reason: String,
    },

    /// Delete blocked by rows referencing the deleted rows
    #[error("Cannot delete from '{table}': constraint '{constraint}' in table '{referencing_table}' still references it")]
    ReferentialIntegrityViolation {
        table: String,
        constraint: String,
        referencing_table: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),

    /// Transient I/O error that may succeed on retry
    #[error("Transient I/O error: {0}")]
    TransientIoError(String),

    /// Record or index bytes could not be decoded
    #[error("Corrupt record in '{source_name}': {detail}")]
    CorruptRecord { source_name: String, detail: String },

    /// Index file missing or unreadable on load
    #[error("Index file '{path}' unavailable: {reason}")]
    IndexFileUnavailable { path: String, reason: String },
}

impl DbError {
    /// Maps the error onto its taxonomy category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::TableNotFound { .. }
            | DbError::TableAlreadyExists(_)
            | DbError::FieldNotFound { .. }
            | DbError::FieldAlreadyExists { .. }
            | DbError::InvalidField { .. }
            | DbError::ConstraintNotFound { .. }
            | DbError::ConstraintAlreadyExists { .. }
            | DbError::IndexNotFound(_)
            | DbError::IndexAlreadyExists(_)
            | DbError::AmbiguousColumn { .. }
            | DbError::TypeMismatch { .. }
            | DbError::InvalidExpression { .. }
            | DbError::RowNotFound { .. } => ErrorKind::Schema,
            DbError::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            DbError::ReferentialIntegrityViolation { .. } => ErrorKind::ReferentialIntegrity,
            DbError::SerializationError(_)
            | DbError::IoError(_)
            | DbError::TransientIoError(_) => ErrorKind::Io,
            DbError::CorruptRecord { .. } => ErrorKind::CorruptRecord,
            DbError::IndexFileUnavailable { .. } => ErrorKind::IndexFileUnavailable,
        }
    }

    /// Returns true for constraint violations, including referential ones.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConstraintViolation | ErrorKind::ReferentialIntegrity
        )
    }

    pub(crate) fn invalid_expression(expression: &str, reason: impl Into<String>) -> Self {
        DbError::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        DbError::CorruptRecord {
            source_name: source_name.into(),
            detail: detail.into(),
        }
    }
}
