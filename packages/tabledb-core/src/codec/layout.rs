//! Fixed row layout derived from a table's field descriptors.

use crate::error::DbError;
use crate::table::FieldDescriptor;
use crate::types::{Row, NULL};

use super::{decode_field, encode_field_into, slot_size};

/// Bytes before the first field slot: `row_id: u64` and `delete_flag: u8`.
pub const ROW_HEADER_SIZE: usize = 9;

/// Aligns an offset to the given alignment.
pub fn align_offset(offset: usize, align: usize) -> usize {
    if align == 0 {
        return offset;
    }
    let remainder = offset % align;
    if remainder == 0 {
        offset
    } else {
        offset + (align - remainder)
    }
}

/// Byte layout of one row: header followed by one slot per field in schema order.
#[derive(Debug, Clone)]
pub struct RowLayout {
    /// Field definitions in schema order
    fields: Vec<FieldDescriptor>,
    /// Slot offset of each field within the row
    offsets: Vec<usize>,
    /// Size of each row in bytes
    row_size: usize,
}

impl RowLayout {
    /// Computes slot offsets and the row size.
    ///
    /// # Returns
    /// `Err(DbError::InvalidField)` if the row size overflows.
    pub fn new(fields: &[FieldDescriptor]) -> Result<Self, DbError> {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = ROW_HEADER_SIZE;

        for field in fields {
            offsets.push(offset);
            offset = offset
                .checked_add(slot_size(field))
                .ok_or_else(|| DbError::InvalidField {
                    field: field.name.clone(),
                    reason: "row size overflows".to_string(),
                })?;
        }

        Ok(Self {
            fields: fields.to_vec(),
            offsets,
            row_size: offset,
        })
    }

    /// Size of each row in bytes.
    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Field definitions in schema order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Slot offset of the named field.
    pub fn field_offset(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|pos| self.offsets[pos])
    }

    /// Encodes a full row. Fields missing from `values` are written as NULL.
    pub fn encode_row(
        &self,
        row_id: u64,
        deleted: bool,
        values: &Row,
        strict_varchar: bool,
    ) -> Result<Vec<u8>, DbError> {
        let mut data = Vec::with_capacity(self.row_size);
        data.extend_from_slice(&row_id.to_ne_bytes());
        data.push(u8::from(deleted));

        for field in &self.fields {
            let value = values.get(&field.name).map(String::as_str).unwrap_or(NULL);
            encode_field_into(field, value, strict_varchar, &mut data)?;
        }

        debug_assert_eq!(data.len(), self.row_size);
        Ok(data)
    }

    /// Reads the row id and raw delete flag from a row header.
    pub fn decode_header(&self, data: &[u8]) -> Option<(u64, u8)> {
        if data.len() < ROW_HEADER_SIZE {
            return None;
        }
        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&data[..8]);
        Some((u64::from_ne_bytes(id_bytes), data[8]))
    }

    /// Decodes every field slot of a row.
    pub fn decode_values(&self, data: &[u8]) -> Result<Row, DbError> {
        if data.len() < self.row_size {
            return Err(DbError::corrupt(
                "row",
                format!("row holds {} bytes, expected {}", data.len(), self.row_size),
            ));
        }

        let mut row = Row::new();
        for (field, &offset) in self.fields.iter().zip(&self.offsets) {
            let slot = &data[offset..offset + slot_size(field)];
            row.insert(field.name.clone(), decode_field(field, slot)?);
        }
        Ok(row)
    }
}
