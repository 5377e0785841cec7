//! B-tree node and leaf entry.

use crate::storage::RecordPointer;

use super::key::split_suffix;

/// Maximum number of children of an internal node.
pub const DEGREE: usize = 3;
/// Maximum keys per node.
pub const MAX_KEYS: usize = DEGREE - 1;
/// Minimum keys per non-root node: `ceil(DEGREE / 2) - 1`.
pub const MIN_KEYS: usize = DEGREE.div_ceil(2) - 1;

/// An index entry: stored key and the row it locates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPointer {
    pub key: String,
    pub pointer: RecordPointer,
}

impl FieldPointer {
    pub fn new(key: impl Into<String>, row_id: u64) -> Self {
        Self {
            key: key.into(),
            pointer: RecordPointer { row_id },
        }
    }

    /// The indexed value, without the row-id suffix.
    pub fn value(&self) -> &str {
        split_suffix(&self.key).0
    }
}

/// A node owning its keys and children. A node without children is a leaf.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BTreeNode {
    pub(crate) keys: Vec<FieldPointer>,
    pub(crate) children: Vec<BTreeNode>,
}

impl BTreeNode {
    pub fn leaf(keys: Vec<FieldPointer>) -> Self {
        Self {
            keys,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn keys(&self) -> &[FieldPointer] {
        &self.keys
    }

    pub fn children(&self) -> &[BTreeNode] {
        &self.children
    }
}
