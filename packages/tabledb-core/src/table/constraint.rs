//! Constraint declarations attached to a table.

use serde::{Deserialize, Serialize};

/// Constraint kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Check,
    Unique,
    NotNull,
    Default,
    AutoIncrement,
}

impl ConstraintKind {
    /// On-disk code used in `.tic` files.
    pub fn code(self) -> i32 {
        match self {
            ConstraintKind::PrimaryKey => 1,
            ConstraintKind::ForeignKey => 2,
            ConstraintKind::Check => 3,
            ConstraintKind::Unique => 4,
            ConstraintKind::NotNull => 5,
            ConstraintKind::Default => 6,
            ConstraintKind::AutoIncrement => 7,
        }
    }

    /// Inverse of [`ConstraintKind::code`].
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(ConstraintKind::PrimaryKey),
            2 => Some(ConstraintKind::ForeignKey),
            3 => Some(ConstraintKind::Check),
            4 => Some(ConstraintKind::Unique),
            5 => Some(ConstraintKind::NotNull),
            6 => Some(ConstraintKind::Default),
            7 => Some(ConstraintKind::AutoIncrement),
            _ => None,
        }
    }

    /// Kinds that fill in values rather than reject them.
    pub fn is_generative(self) -> bool {
        matches!(self, ConstraintKind::Default | ConstraintKind::AutoIncrement)
    }
}

/// A constraint declared on a field, or on the whole table when `field` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDescriptor {
    /// Constraint name, reported on violation
    pub name: String,
    /// Constrained field; empty for table-level constraints
    pub field: String,
    /// Constraint kind
    pub kind: ConstraintKind,
    /// Referenced `table.field`, check expression or default literal
    pub param: String,
}

/// Target of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignReference {
    /// Name of the referenced table
    pub table: String,
    /// Field name in the referenced table
    pub field: String,
}

impl ConstraintDescriptor {
    pub fn new(
        name: impl Into<String>,
        field: impl Into<String>,
        kind: ConstraintKind,
        param: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            kind,
            param: param.into(),
        }
    }

    pub fn primary_key(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, field, ConstraintKind::PrimaryKey, "")
    }

    /// Foreign key; `reference` is `table.field` or `table(field)`.
    pub fn foreign_key(
        name: impl Into<String>,
        field: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self::new(name, field, ConstraintKind::ForeignKey, reference)
    }

    /// Check constraint; an empty `field` makes it table-level.
    pub fn check(
        name: impl Into<String>,
        field: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self::new(name, field, ConstraintKind::Check, expression)
    }

    pub fn unique(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, field, ConstraintKind::Unique, "")
    }

    pub fn not_null(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, field, ConstraintKind::NotNull, "")
    }

    pub fn default_value(
        name: impl Into<String>,
        field: impl Into<String>,
        literal: impl Into<String>,
    ) -> Self {
        Self::new(name, field, ConstraintKind::Default, literal)
    }

    pub fn auto_increment(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, field, ConstraintKind::AutoIncrement, "")
    }

    /// Whether this constraint applies to the whole row.
    pub fn is_table_level(&self) -> bool {
        self.field.is_empty()
    }

    /// Parses the referenced table and field of a foreign key.
    pub fn foreign_reference(&self) -> Option<ForeignReference> {
        if self.kind != ConstraintKind::ForeignKey {
            return None;
        }
        let param = self.param.trim();
        let (table, field) = if let Some((table, rest)) = param.split_once('(') {
            (table, rest.strip_suffix(')')?)
        } else {
            param.split_once('.')?
        };
        let (table, field) = (table.trim(), field.trim());
        if table.is_empty() || field.is_empty() {
            return None;
        }
        Some(ForeignReference {
            table: table.to_string(),
            field: field.to_string(),
        })
    }
}
