//! 2-3 B-tree over string keys.
//!
//! Insertion descends to a leaf and splits overflowing nodes on the way back
//! up. Removal repairs underflowing children on the way back up by borrowing
//! from a sibling or merging with one.

use std::cmp::Ordering;
use std::ops::Bound;

use crate::storage::RecordPointer;

use super::key::KeyOrder;
use super::node::{BTreeNode, FieldPointer, MAX_KEYS, MIN_KEYS};

/// B-tree of degree 3 mapping keys to record pointers.
#[derive(Debug, Clone)]
pub struct BTree {
    root: BTreeNode,
    order: KeyOrder,
    len: usize,
}

enum InsertOutcome {
    Inserted,
    Replaced(RecordPointer),
    Split(FieldPointer, BTreeNode),
}

impl BTree {
    /// Creates an empty tree ordered by `order`.
    pub fn new(order: KeyOrder) -> Self {
        Self {
            root: BTreeNode::default(),
            order,
            len: 0,
        }
    }

    /// Assembles a tree from a loaded root, checking its structure.
    pub(crate) fn from_root(root: BTreeNode, order: KeyOrder) -> Result<Self, String> {
        let mut tree = Self {
            root,
            order,
            len: 0,
        };
        tree.len = tree.validate()?;
        Ok(tree)
    }

    pub fn order(&self) -> &KeyOrder {
        &self.order
    }

    pub fn root(&self) -> &BTreeNode {
        &self.root
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of levels; 1 for a lone root leaf.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut node = &self.root;
        while let Some(child) = node.children.first() {
            height += 1;
            node = child;
        }
        height
    }

    /// Inserts a key, or replaces the pointer of an existing equal key.
    ///
    /// # Returns
    /// The previous pointer when the key was already present.
    pub fn insert(&mut self, key: impl Into<String>, pointer: RecordPointer) -> Option<RecordPointer> {
        let entry = FieldPointer {
            key: key.into(),
            pointer,
        };
        match insert_into(&mut self.root, entry, &self.order) {
            InsertOutcome::Replaced(old) => return Some(old),
            InsertOutcome::Inserted => {}
            InsertOutcome::Split(median, right) => {
                let left = std::mem::take(&mut self.root);
                self.root = BTreeNode {
                    keys: vec![median],
                    children: vec![left, right],
                };
            }
        }
        self.len += 1;
        None
    }

    /// Exact lookup.
    pub fn find(&self, key: &str) -> Option<&FieldPointer> {
        let mut node = &self.root;
        loop {
            match search(node, key, &self.order) {
                Ok(idx) => return Some(&node.keys[idx]),
                Err(idx) => node = node.children.get(idx)?,
            }
        }
    }

    /// Entries with `low <= key <= high`, ascending.
    pub fn find_range(&self, low: &str, high: &str) -> Vec<FieldPointer> {
        self.range(Bound::Included(low), Bound::Included(high))
    }

    /// Entries within the given bounds, ascending.
    pub fn range(&self, low: Bound<&str>, high: Bound<&str>) -> Vec<FieldPointer> {
        let mut out = Vec::new();
        collect_range(&self.root, low, high, &self.order, &mut out);
        out
    }

    /// Every entry, ascending.
    pub fn entries(&self) -> Vec<FieldPointer> {
        self.range(Bound::Unbounded, Bound::Unbounded)
    }

    /// Removes a key.
    ///
    /// # Returns
    /// The removed entry, or `None` if the key was absent.
    pub fn remove(&mut self, key: &str) -> Option<FieldPointer> {
        let removed = remove_from(&mut self.root, key, &self.order)?;
        if self.root.keys.is_empty() && !self.root.is_leaf() {
            self.root = self.root.children.remove(0);
        }
        self.len -= 1;
        Some(removed)
    }

    /// Checks the structural invariants.
    ///
    /// # Returns
    /// The number of keys, or a description of the first violation found.
    pub fn validate(&self) -> Result<usize, String> {
        let mut leaf_depth = None;
        validate_node(&self.root, true, 0, &mut leaf_depth, None, None, &self.order)
    }
}

/// Binary search: `Ok(idx)` on an equal key, else `Err(child index)`.
fn search(node: &BTreeNode, key: &str, order: &KeyOrder) -> Result<usize, usize> {
    node.keys
        .binary_search_by(|entry| order.compare(&entry.key, key))
}

fn insert_into(node: &mut BTreeNode, entry: FieldPointer, order: &KeyOrder) -> InsertOutcome {
    let idx = match search(node, &entry.key, order) {
        Ok(idx) => {
            let old = std::mem::replace(&mut node.keys[idx].pointer, entry.pointer);
            return InsertOutcome::Replaced(old);
        }
        Err(idx) => idx,
    };

    if node.is_leaf() {
        node.keys.insert(idx, entry);
    } else {
        match insert_into(&mut node.children[idx], entry, order) {
            InsertOutcome::Split(median, right) => {
                node.keys.insert(idx, median);
                node.children.insert(idx + 1, right);
            }
            other => return other,
        }
    }

    if node.keys.len() > MAX_KEYS {
        let (median, right) = split(node);
        InsertOutcome::Split(median, right)
    } else {
        InsertOutcome::Inserted
    }
}

/// Splits an overflowing node around its median key.
fn split(node: &mut BTreeNode) -> (FieldPointer, BTreeNode) {
    let mid = node.keys.len() / 2;
    let right_keys = node.keys.split_off(mid + 1);
    let right_children = if node.is_leaf() {
        Vec::new()
    } else {
        node.children.split_off(mid + 1)
    };
    // split_off leaves exactly mid + 1 keys behind
    let median = node.keys.remove(mid);
    (
        median,
        BTreeNode {
            keys: right_keys,
            children: right_children,
        },
    )
}

fn remove_from(node: &mut BTreeNode, key: &str, order: &KeyOrder) -> Option<FieldPointer> {
    match search(node, key, order) {
        Ok(idx) if node.is_leaf() => Some(node.keys.remove(idx)),
        Ok(idx) => {
            // Replace with predecessor when the left child can spare a key,
            // else with successor when the right child can, else predecessor
            // and let the fix-up merge.
            let use_successor = node.children[idx].keys.len() <= MIN_KEYS
                && node.children[idx + 1].keys.len() > MIN_KEYS;
            let (replacement, child) = if use_successor {
                (pop_min(&mut node.children[idx + 1])?, idx + 1)
            } else {
                (pop_max(&mut node.children[idx])?, idx)
            };
            let removed = std::mem::replace(&mut node.keys[idx], replacement);
            fix_child(node, child);
            Some(removed)
        }
        Err(_) if node.is_leaf() => None,
        Err(idx) => {
            let removed = remove_from(&mut node.children[idx], key, order)?;
            fix_child(node, idx);
            Some(removed)
        }
    }
}

fn pop_max(node: &mut BTreeNode) -> Option<FieldPointer> {
    if node.is_leaf() {
        return node.keys.pop();
    }
    let last = node.children.len() - 1;
    let entry = pop_max(&mut node.children[last])?;
    fix_child(node, last);
    Some(entry)
}

fn pop_min(node: &mut BTreeNode) -> Option<FieldPointer> {
    if node.is_leaf() {
        return (!node.keys.is_empty()).then(|| node.keys.remove(0));
    }
    let entry = pop_min(&mut node.children[0])?;
    fix_child(node, 0);
    Some(entry)
}

/// Restores the minimum key count of `node.children[idx]`.
fn fix_child(node: &mut BTreeNode, idx: usize) {
    if node.children[idx].keys.len() >= MIN_KEYS {
        return;
    }
    if idx > 0 && node.children[idx - 1].keys.len() > MIN_KEYS {
        borrow_from_left(node, idx);
    } else if idx + 1 < node.children.len() && node.children[idx + 1].keys.len() > MIN_KEYS {
        borrow_from_right(node, idx);
    } else if idx > 0 {
        merge(node, idx - 1);
    } else {
        merge(node, idx);
    }
}

fn borrow_from_left(node: &mut BTreeNode, idx: usize) {
    let (left_part, right_part) = node.children.split_at_mut(idx);
    let left = &mut left_part[idx - 1];
    let child = &mut right_part[0];

    let Some(moved_key) = left.keys.pop() else {
        return;
    };
    let separator = std::mem::replace(&mut node.keys[idx - 1], moved_key);
    child.keys.insert(0, separator);
    if let Some(moved_child) = left.children.pop() {
        child.children.insert(0, moved_child);
    }
}

fn borrow_from_right(node: &mut BTreeNode, idx: usize) {
    let (left_part, right_part) = node.children.split_at_mut(idx + 1);
    let child = &mut left_part[idx];
    let right = &mut right_part[0];

    if right.keys.is_empty() {
        return;
    }
    let moved_key = right.keys.remove(0);
    let separator = std::mem::replace(&mut node.keys[idx], moved_key);
    child.keys.push(separator);
    if !right.is_leaf() {
        child.children.push(right.children.remove(0));
    }
}

/// Merges `children[idx + 1]` and the separator key into `children[idx]`.
fn merge(node: &mut BTreeNode, idx: usize) {
    let separator = node.keys.remove(idx);
    let right = node.children.remove(idx + 1);
    let left = &mut node.children[idx];
    left.keys.push(separator);
    left.keys.extend(right.keys);
    left.children.extend(right.children);
}

fn collect_range(
    node: &BTreeNode,
    low: Bound<&str>,
    high: Bound<&str>,
    order: &KeyOrder,
    out: &mut Vec<FieldPointer>,
) {
    // Keys in children[i] sort below keys[i]
    let greater_than_low = |key: &str| match low {
        Bound::Unbounded => true,
        Bound::Included(l) | Bound::Excluded(l) => order.compare(key, l) == Ordering::Greater,
    };
    let within_low = |key: &str| match low {
        Bound::Unbounded => true,
        Bound::Included(l) => order.compare(key, l) != Ordering::Less,
        Bound::Excluded(l) => order.compare(key, l) == Ordering::Greater,
    };
    let within_high = |key: &str| match high {
        Bound::Unbounded => true,
        Bound::Included(h) => order.compare(key, h) != Ordering::Greater,
        Bound::Excluded(h) => order.compare(key, h) == Ordering::Less,
    };

    for (i, entry) in node.keys.iter().enumerate() {
        if !node.is_leaf() && greater_than_low(&entry.key) {
            collect_range(&node.children[i], low, high, order, out);
        }
        if !within_high(&entry.key) {
            return;
        }
        if within_low(&entry.key) {
            out.push(entry.clone());
        }
    }
    if let Some(last) = node.children.last() {
        collect_range(last, low, high, order, out);
    }
}

fn validate_node(
    node: &BTreeNode,
    is_root: bool,
    depth: usize,
    leaf_depth: &mut Option<usize>,
    lower: Option<&str>,
    upper: Option<&str>,
    order: &KeyOrder,
) -> Result<usize, String> {
    if node.keys.len() > MAX_KEYS {
        return Err(format!("node at depth {} has {} keys", depth, node.keys.len()));
    }
    if !is_root && node.keys.len() < MIN_KEYS {
        return Err(format!("non-root node at depth {} is empty", depth));
    }
    for pair in node.keys.windows(2) {
        if order.compare(&pair[0].key, &pair[1].key) != Ordering::Less {
            return Err(format!("keys '{}' and '{}' out of order", pair[0].key, pair[1].key));
        }
    }
    if let (Some(first), Some(lower)) = (node.keys.first(), lower) {
        if order.compare(&first.key, lower) != Ordering::Greater {
            return Err(format!("key '{}' not above separator '{}'", first.key, lower));
        }
    }
    if let (Some(last), Some(upper)) = (node.keys.last(), upper) {
        if order.compare(&last.key, upper) != Ordering::Less {
            return Err(format!("key '{}' not below separator '{}'", last.key, upper));
        }
    }

    if node.is_leaf() {
        match *leaf_depth {
            None => *leaf_depth = Some(depth),
            Some(expected) if expected != depth => {
                return Err(format!("leaf at depth {}, expected {}", depth, expected))
            }
            _ => {}
        }
        return Ok(node.keys.len());
    }

    if node.children.len() != node.keys.len() + 1 {
        return Err(format!(
            "node at depth {} has {} keys and {} children",
            depth,
            node.keys.len(),
            node.children.len()
        ));
    }

    let mut count = node.keys.len();
    for (i, child) in node.children.iter().enumerate() {
        let child_lower = if i == 0 { lower } else { Some(node.keys[i - 1].key.as_str()) };
        let child_upper = node.keys.get(i).map(|k| k.key.as_str()).or(upper);
        count += validate_node(child, false, depth + 1, leaf_depth, child_lower, child_upper, order)?;
    }
    Ok(count)
}
