//! Column names visible to a query and how bare names resolve to them.

use std::collections::HashMap;

use crate::error::DbError;
use crate::table::Table;
use crate::types::FieldKind;

/// Columns of a query source, in source order, with their kinds.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Table name(s), for error messages
    source: String,
    columns: Vec<String>,
    kinds: HashMap<String, FieldKind>,
}

impl Schema {
    /// Bare field names of one table.
    pub fn single(table: &Table) -> Self {
        let mut schema = Self {
            source: table.name.clone(),
            ..Self::default()
        };
        for field in &table.fields {
            schema.push(field.name.clone(), Some(field.kind));
        }
        schema
    }

    /// `table.field` names of several tables, in the given order.
    pub fn prefixed<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Self {
        let mut schema = Self::default();
        let mut names = Vec::new();
        for table in tables {
            names.push(table.name.as_str());
            for field in &table.fields {
                schema.push(format!("{}.{}", table.name, field.name), Some(field.kind));
            }
        }
        schema.source = names.join(", ");
        schema
    }

    pub fn push(&mut self, column: String, kind: Option<FieldKind>) {
        if let Some(kind) = kind {
            self.kinds.insert(column.clone(), kind);
        }
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn kind(&self, column: &str) -> Option<FieldKind> {
        self.kinds.get(column).copied()
    }

    /// Resolves a column reference to a row key.
    ///
    /// An exact match wins; otherwise a bare name matches a unique
    /// `prefix.name` column.
    ///
    /// # Returns
    /// `Err(DbError::AmbiguousColumn)` when several prefixed columns match, or
    /// `Err(DbError::FieldNotFound)` when none does.
    pub fn resolve(&self, name: &str) -> Result<String, DbError> {
        self.try_resolve(name)?.ok_or_else(|| DbError::FieldNotFound {
            table: self.source.clone(),
            field: name.to_string(),
        })
    }

    /// Like [`Schema::resolve`] but `Ok(None)` when nothing matches.
    pub fn try_resolve(&self, name: &str) -> Result<Option<String>, DbError> {
        if self.columns.iter().any(|c| c == name) {
            return Ok(Some(name.to_string()));
        }
        // `users.id` against a single `users` table
        if let Some(bare) = name
            .strip_prefix(self.source.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
        {
            if self.columns.iter().any(|c| c == bare) {
                return Ok(Some(bare.to_string()));
            }
        }
        let suffix = format!(".{}", name);
        let mut matches = self.columns.iter().filter(|c| c.ends_with(&suffix));
        match (matches.next(), matches.next()) {
            (Some(column), None) => Ok(Some(column.clone())),
            (Some(_), Some(_)) => Err(DbError::AmbiguousColumn {
                column: name.to_string(),
            }),
            (None, _) => Ok(None),
        }
    }
}
