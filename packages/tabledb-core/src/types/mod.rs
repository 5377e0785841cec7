//! Field kinds, the string interchange representation of values, and
//! kind-aware value comparison.

mod datetime;
mod field_kind;
mod value;

use std::collections::BTreeMap;

pub use datetime::{format_datetime, parse_datetime};
pub use field_kind::FieldKind;
pub use value::{compare_values, is_null, unquote, values_equal, NULL};

/// A decoded row: field name to string-encoded value (or [`NULL`]).
///
/// Multi-table results use `table.field` keys.
pub type Row = BTreeMap<String, String>;
