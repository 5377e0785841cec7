//! ORDER BY: a single sort key with an optional direction.

use std::cmp::Ordering;

use crate::error::DbError;
use crate::types::{compare_values, is_null, Row};

use super::aggregate::Aggregate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column reference or aggregate label
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    /// Parses `column [ASC|DESC]`.
    pub fn parse(source: &str) -> Result<Self, DbError> {
        let trimmed = source.trim();
        let (column, direction) = match trimmed.rsplit_once(char::is_whitespace) {
            Some((column, direction))
                if direction.eq_ignore_ascii_case("ASC") || direction.eq_ignore_ascii_case("DESC") =>
            {
                (column.trim(), Some(direction))
            }
            _ => (trimmed, None),
        };
        if column.is_empty() {
            return Err(DbError::invalid_expression(source, "missing sort column"));
        }
        if column.contains(char::is_whitespace) && Aggregate::parse(column).is_none() {
            return Err(DbError::invalid_expression(
                source,
                "only a single sort key is supported",
            ));
        }

        let column = match Aggregate::parse(column) {
            Some(aggregate) => aggregate.label(),
            None => column.to_string(),
        };
        Ok(Self {
            column,
            descending: direction.is_some_and(|d| d.eq_ignore_ascii_case("DESC")),
        })
    }
}

/// Stable sort on `key`. NULLs go last in either direction; values compare
/// numerically when both parse, else as text.
pub(crate) fn sort_rows(rows: &mut [Row], key: &str, descending: bool) {
    rows.sort_by(|a, b| {
        let a = a.get(key).filter(|v| !is_null(v));
        let b = b.get(key).filter(|v| !is_null(v));
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                let ordering = compare_values(None, a, b);
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        }
    });
}
