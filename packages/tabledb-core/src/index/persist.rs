//! `.tid` index file format.
//!
//! Header: `magic: [u8; 4] = "TIDX" | version: u32 | component_count: u8 |
//! component codes: [u8] | body_len: u64 | body_crc32: u32`.
//!
//! Body, nodes in pre-order: `is_leaf: u8 | key_count: u32 |
//! (key_len: u32 | key bytes | row_id: u64) * key_count | child_count: u32`,
//! each node followed by its children. Integers use native endianness.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crc32fast::Hasher;

use crate::error::DbError;
use crate::storage::io_utils::{classify_io_error, temp_path_for};
use crate::storage::RecordPointer;

use super::btree::BTree;
use super::key::{ComponentOrder, KeyOrder};
use super::node::{BTreeNode, FieldPointer, DEGREE};

const MAGIC: &[u8; 4] = b"TIDX";
const VERSION: u32 = 1;

/// Serializes a tree.
pub fn encode_tree(tree: &BTree) -> Vec<u8> {
    let mut body = Vec::new();
    encode_node(tree.root(), &mut body);

    let mut hasher = Hasher::new();
    hasher.update(&body);
    let checksum = hasher.finalize();

    let components = tree.order().components();
    let mut data = Vec::with_capacity(body.len() + 24);
    data.extend_from_slice(MAGIC);
    data.extend_from_slice(&VERSION.to_ne_bytes());
    data.push(components.len() as u8);
    data.extend(components.iter().map(|c| c.code()));
    data.extend_from_slice(&(body.len() as u64).to_ne_bytes());
    data.extend_from_slice(&checksum.to_ne_bytes());
    data.extend_from_slice(&body);
    data
}

fn encode_node(node: &BTreeNode, out: &mut Vec<u8>) {
    out.push(u8::from(node.is_leaf()));
    out.extend_from_slice(&(node.keys.len() as u32).to_ne_bytes());
    for entry in &node.keys {
        out.extend_from_slice(&(entry.key.len() as u32).to_ne_bytes());
        out.extend_from_slice(entry.key.as_bytes());
        out.extend_from_slice(&entry.pointer.row_id.to_ne_bytes());
    }
    out.extend_from_slice(&(node.children.len() as u32).to_ne_bytes());
    for child in &node.children {
        encode_node(child, out);
    }
}

/// Deserializes a tree, rebuilding every parent/child link.
///
/// # Returns
/// `Err(DbError::CorruptRecord)` on a bad magic, checksum, truncated body or a
/// tree that violates the B-tree invariants.
pub fn decode_tree(data: &[u8], source: &str) -> Result<BTree, DbError> {
    let mut reader = Reader {
        data,
        pos: 0,
        source,
    };

    if reader.take(4)? != MAGIC {
        return Err(DbError::corrupt(source, "bad index file magic"));
    }
    let version = reader.u32()?;
    if version != VERSION {
        return Err(DbError::corrupt(
            source,
            format!("unsupported index file version {}", version),
        ));
    }
    let component_count = reader.u8()? as usize;
    let components = reader
        .take(component_count)?
        .iter()
        .map(|&code| {
            ComponentOrder::from_code(code)
                .ok_or_else(|| DbError::corrupt(source, format!("unknown key order {}", code)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let body_len = reader.u64()? as usize;
    let checksum = reader.u32()?;
    let body = reader.take(body_len)?;
    if reader.pos != data.len() {
        return Err(DbError::corrupt(source, "trailing bytes after index body"));
    }

    let mut hasher = Hasher::new();
    hasher.update(body);
    if hasher.finalize() != checksum {
        return Err(DbError::corrupt(source, "index checksum mismatch"));
    }

    let mut body_reader = Reader {
        data: body,
        pos: 0,
        source,
    };
    let root = decode_node(&mut body_reader, 0)?;
    if body_reader.pos != body.len() {
        return Err(DbError::corrupt(source, "trailing bytes after root node"));
    }

    BTree::from_root(root, KeyOrder::new(components))
        .map_err(|reason| DbError::corrupt(source, reason))
}

fn decode_node(reader: &mut Reader<'_>, depth: usize) -> Result<BTreeNode, DbError> {
    // A 2-3 tree over u64 row ids never gets close to this
    const MAX_DEPTH: usize = 64;
    if depth > MAX_DEPTH {
        return Err(DbError::corrupt(reader.source, "index tree too deep"));
    }

    let is_leaf = reader.u8()? == 1;
    let key_count = reader.u32()? as usize;
    if key_count >= DEGREE {
        return Err(DbError::corrupt(
            reader.source,
            format!("node holds {} keys", key_count),
        ));
    }

    let mut keys = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        let key_len = reader.u32()? as usize;
        let key = std::str::from_utf8(reader.take(key_len)?)
            .map_err(|e| DbError::corrupt(reader.source, e.to_string()))?
            .to_string();
        let row_id = reader.u64()?;
        keys.push(FieldPointer {
            key,
            pointer: RecordPointer { row_id },
        });
    }

    let child_count = reader.u32()? as usize;
    let expected = if is_leaf { 0 } else { key_count + 1 };
    if child_count != expected {
        return Err(DbError::corrupt(
            reader.source,
            format!("node with {} keys has {} children", key_count, child_count),
        ));
    }

    let children = (0..child_count)
        .map(|_| decode_node(reader, depth + 1))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BTreeNode { keys, children })
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    source: &'a str,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], DbError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| DbError::corrupt(self.source, "index file truncated"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, DbError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DbError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_ne_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, DbError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_ne_bytes(buf))
    }
}

/// Writes the tree to `path` through a temp file and rename.
pub fn save_tree(tree: &BTree, path: &Path) -> Result<(), DbError> {
    let data = encode_tree(tree);
    let temp_path = temp_path_for(path);

    let mut file = File::create(&temp_path)
        .map_err(|e| classify_io_error(e, "Failed to create temp index file"))?;
    file.write_all(&data)
        .map_err(|e| classify_io_error(e, "Failed to write index file"))?;
    file.sync_all()
        .map_err(|e| classify_io_error(e, "Failed to sync index file"))?;
    fs::rename(&temp_path, path)
        .map_err(|e| classify_io_error(e, "Failed to rename index file"))?;
    Ok(())
}

/// Reads a tree from `path`.
///
/// # Returns
/// `Err(DbError::IndexFileUnavailable)` if the file cannot be read.
pub fn load_tree(path: &Path) -> Result<BTree, DbError> {
    let data = fs::read(path).map_err(|e| DbError::IndexFileUnavailable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    decode_tree(&data, &path.display().to_string())
}
