use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// Storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// 32-bit signed integer
    Int,
    /// 64-bit float
    Double,
    /// Fixed-width string, width given by the field parameter
    Varchar,
    /// Single byte boolean
    Bool,
    /// Seconds since the Unix epoch
    DateTime,
}

impl FieldKind {
    /// On-disk code used in `.tdf` files.
    pub fn code(self) -> i32 {
        match self {
            FieldKind::Int => 1,
            FieldKind::Double => 2,
            FieldKind::Varchar => 3,
            FieldKind::Bool => 4,
            FieldKind::DateTime => 5,
        }
    }

    /// Inverse of [`FieldKind::code`].
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(FieldKind::Int),
            2 => Some(FieldKind::Double),
            3 => Some(FieldKind::Varchar),
            4 => Some(FieldKind::Bool),
            5 => Some(FieldKind::DateTime),
            _ => None,
        }
    }

    /// Payload size in bytes, excluding the null flag and padding.
    pub fn data_size(self, param: usize) -> usize {
        match self {
            FieldKind::Int => 4,
            FieldKind::Double => 8,
            FieldKind::Varchar => param,
            FieldKind::Bool => 1,
            FieldKind::DateTime => 8,
        }
    }

    /// Whether values of this kind compare numerically.
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Int | FieldKind::Double)
    }

    /// Parses a type name as written in DDL: `INT`, `DOUBLE`, `VARCHAR(20)`,
    /// `BOOL`, `DATETIME`. Returns the kind and its parameter.
    pub fn parse(type_name: &str) -> Result<(Self, usize), DbError> {
        let upper = type_name.trim().to_ascii_uppercase();
        let mismatch = || DbError::TypeMismatch {
            expected: "INT, DOUBLE, VARCHAR(n), BOOL or DATETIME".to_string(),
            got: type_name.to_string(),
        };

        if let Some(rest) = upper.strip_prefix("VARCHAR") {
            let inner = rest
                .trim()
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or_else(mismatch)?;
            let len: usize = inner.trim().parse().map_err(|_| mismatch())?;
            return Ok((FieldKind::Varchar, len));
        }

        let kind = match upper.as_str() {
            "INT" | "INTEGER" => FieldKind::Int,
            "DOUBLE" | "FLOAT" | "REAL" => FieldKind::Double,
            "BOOL" | "BOOLEAN" => FieldKind::Bool,
            "DATETIME" | "TIMESTAMP" => FieldKind::DateTime,
            _ => return Err(mismatch()),
        };
        Ok((kind, 0))
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldKind::Int => "INT",
            FieldKind::Double => "DOUBLE",
            FieldKind::Varchar => "VARCHAR",
            FieldKind::Bool => "BOOL",
            FieldKind::DateTime => "DATETIME",
        };
        f.write_str(name)
    }
}
