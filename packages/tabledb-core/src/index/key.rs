//! Ordering of index keys.
//!
//! A stored key is the indexed value, with composite components joined by
//! [`COMPONENT_SEP`], optionally followed by [`ROW_ID_SEP`] and a
//! zero-padded row id. Components compare according to their field kind; the
//! row-id suffix breaks ties so equal values from different rows stay distinct.

use std::cmp::Ordering;

use crate::types::{compare_values, FieldKind};

/// Separates the indexed value from the row-id suffix.
pub const ROW_ID_SEP: char = '\u{1f}';

/// Separates the components of a composite key. Never part of a field value.
pub const COMPONENT_SEP: char = '\u{1e}';

/// How one key component is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentOrder {
    Numeric,
    DateTime,
    Text,
}

impl ComponentOrder {
    pub fn for_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Int | FieldKind::Double => ComponentOrder::Numeric,
            FieldKind::DateTime => ComponentOrder::DateTime,
            FieldKind::Varchar | FieldKind::Bool => ComponentOrder::Text,
        }
    }

    pub(crate) fn code(self) -> u8 {
        match self {
            ComponentOrder::Numeric => 1,
            ComponentOrder::DateTime => 2,
            ComponentOrder::Text => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ComponentOrder::Numeric),
            2 => Some(ComponentOrder::DateTime),
            3 => Some(ComponentOrder::Text),
            _ => None,
        }
    }

    fn kind(self) -> FieldKind {
        match self {
            ComponentOrder::Numeric => FieldKind::Double,
            ComponentOrder::DateTime => FieldKind::DateTime,
            ComponentOrder::Text => FieldKind::Varchar,
        }
    }
}

/// Total order over stored keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOrder {
    components: Vec<ComponentOrder>,
}

impl KeyOrder {
    pub fn new(components: Vec<ComponentOrder>) -> Self {
        Self { components }
    }

    /// Single text component.
    pub fn text() -> Self {
        Self::new(vec![ComponentOrder::Text])
    }

    /// Single numeric component.
    pub fn numeric() -> Self {
        Self::new(vec![ComponentOrder::Numeric])
    }

    pub fn components(&self) -> &[ComponentOrder] {
        &self.components
    }

    /// Compares two stored or probe keys.
    pub fn compare(&self, left: &str, right: &str) -> Ordering {
        let (left_value, left_suffix) = split_suffix(left);
        let (right_value, right_suffix) = split_suffix(right);

        let parts = self.components.len().max(1);
        let mut left_parts = left_value.splitn(parts, COMPONENT_SEP);
        let mut right_parts = right_value.splitn(parts, COMPONENT_SEP);

        for order in &self.components {
            let ordering = match (left_parts.next(), right_parts.next()) {
                (Some(l), Some(r)) => compare_values(Some(order.kind()), l, r),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        left_suffix.cmp(&right_suffix)
    }
}

/// Splits `value\x1frow_id` into its value and optional suffix.
pub fn split_suffix(key: &str) -> (&str, Option<&str>) {
    match key.rsplit_once(ROW_ID_SEP) {
        Some((value, suffix)) => (value, Some(suffix)),
        None => (key, None),
    }
}

/// Stored key of a value for a given row.
pub fn stored_key(value: &str, row_id: u64) -> String {
    format!("{}{}{:020}", value, ROW_ID_SEP, row_id)
}
