use std::cmp::Ordering;

use super::datetime::parse_datetime;
use super::field_kind::FieldKind;

/// Sentinel carried in place of a value for SQL NULL.
pub const NULL: &str = "NULL";

/// Whether the string is the NULL sentinel (case-insensitive).
pub fn is_null(value: &str) -> bool {
    value.eq_ignore_ascii_case(NULL)
}

/// Strips one pair of surrounding single quotes.
pub fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Compares two non-NULL values.
///
/// With a known kind, numeric kinds compare as `f64` and DateTime as
/// timestamps; either falls back to text when a side does not parse. With no
/// kind, numeric comparison is attempted first.
pub fn compare_values(kind: Option<FieldKind>, left: &str, right: &str) -> Ordering {
    let left = unquote(left);
    let right = unquote(right);

    match kind {
        Some(FieldKind::DateTime) => {
            if let (Some(a), Some(b)) = (parse_datetime(left), parse_datetime(right)) {
                return a.cmp(&b);
            }
        }
        Some(FieldKind::Varchar) | Some(FieldKind::Bool) => return left.cmp(right),
        Some(FieldKind::Int) | Some(FieldKind::Double) | None => {
            if let (Ok(a), Ok(b)) = (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
                return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            }
        }
    }
    left.cmp(right)
}

/// Equality under [`compare_values`], with NULL equal only to NULL.
pub fn values_equal(kind: Option<FieldKind>, left: &str, right: &str) -> bool {
    match (is_null(left), is_null(right)) {
        (true, true) => true,
        (false, false) => compare_values(kind, left, right) == Ordering::Equal,
        _ => false,
    }
}
