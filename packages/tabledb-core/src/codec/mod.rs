//! Field codec: binary encoding of one typed value into its record slot.
//!
//! A slot is laid out as:
//! - `null_flag: u8` (1 when the value is NULL)
//! - payload of `kind.data_size(param)` bytes, zero-filled for NULL
//! - zero padding so the slot length is a multiple of 4
//!
//! Integers, doubles and timestamps use native endianness.

mod layout;

pub use layout::{align_offset, RowLayout, ROW_HEADER_SIZE};

use crate::error::DbError;
use crate::table::FieldDescriptor;
use crate::types::{format_datetime, is_null, parse_datetime, unquote, FieldKind, NULL};

/// Size of the null indicator preceding every payload.
pub const NULL_FLAG_SIZE: usize = 1;

/// Slot alignment in bytes.
pub const SLOT_ALIGN: usize = 4;

/// Total slot size (null flag + payload + padding) for a field.
pub fn slot_size(field: &FieldDescriptor) -> usize {
    align_offset(NULL_FLAG_SIZE + field.data_size(), SLOT_ALIGN)
}

/// Encodes a value into a freshly allocated slot, truncating long Varchars.
pub fn encode_field(field: &FieldDescriptor, value: &str) -> Result<Vec<u8>, DbError> {
    let mut out = Vec::with_capacity(slot_size(field));
    encode_field_into(field, value, false, &mut out)?;
    Ok(out)
}

/// Appends the encoded slot for `value` to `out`.
///
/// # Arguments
/// * `field` - Descriptor giving kind and Varchar width
/// * `value` - String representation, or the NULL sentinel
/// * `strict_varchar` - Reject over-long Varchar values instead of truncating
/// * `out` - Destination buffer
///
/// # Returns
/// `Err(DbError::TypeMismatch)` when a non-NULL value does not parse as the field's kind.
pub fn encode_field_into(
    field: &FieldDescriptor,
    value: &str,
    strict_varchar: bool,
    out: &mut Vec<u8>,
) -> Result<(), DbError> {
    let start = out.len();
    let data_size = field.data_size();
    let value = value.trim();

    if is_null(value) {
        out.push(1);
        out.resize(start + slot_size(field), 0);
        return Ok(());
    }

    out.push(0);
    let mismatch = || DbError::TypeMismatch {
        expected: format!("{} for field '{}'", field.kind, field.name),
        got: value.to_string(),
    };

    match field.kind {
        FieldKind::Int => {
            let parsed: i32 = unquote(value).trim().parse().map_err(|_| mismatch())?;
            out.extend_from_slice(&parsed.to_ne_bytes());
        }
        FieldKind::Double => {
            let parsed: f64 = unquote(value).trim().parse().map_err(|_| mismatch())?;
            out.extend_from_slice(&parsed.to_ne_bytes());
        }
        FieldKind::Bool => {
            let parsed = match unquote(value).trim().to_ascii_lowercase().as_str() {
                "true" | "1" => 1u8,
                "false" | "0" => 0u8,
                _ => return Err(mismatch()),
            };
            out.push(parsed);
        }
        FieldKind::DateTime => {
            let parsed = parse_datetime(value).ok_or_else(mismatch)?;
            out.extend_from_slice(&parsed.to_ne_bytes());
        }
        FieldKind::Varchar => {
            let text = unquote(value);
            let bytes = if text.len() > data_size {
                if strict_varchar {
                    return Err(DbError::TypeMismatch {
                        expected: format!("at most {} bytes for field '{}'", data_size, field.name),
                        got: format!("{} bytes", text.len()),
                    });
                }
                let mut cut = data_size;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                tracing::warn!(
                    "Truncating value for field '{}' from {} to {} bytes",
                    field.name,
                    text.len(),
                    cut
                );
                &text.as_bytes()[..cut]
            } else {
                text.as_bytes()
            };
            out.extend_from_slice(bytes);
            out.resize(start + NULL_FLAG_SIZE + data_size, 0);
        }
    }

    out.resize(start + slot_size(field), 0);
    Ok(())
}

/// Decodes one slot back into its string representation.
///
/// DateTime values come back quoted (`'YYYY-MM-DD HH:MM:SS'`), booleans as
/// `true`/`false`, NULL as the sentinel.
pub fn decode_field(field: &FieldDescriptor, slot: &[u8]) -> Result<String, DbError> {
    let data_size = field.data_size();
    if slot.len() < NULL_FLAG_SIZE + data_size {
        return Err(DbError::corrupt(
            &field.name,
            format!(
                "slot holds {} bytes, expected {}",
                slot.len(),
                NULL_FLAG_SIZE + data_size
            ),
        ));
    }

    match slot[0] {
        0 => {}
        1 => return Ok(NULL.to_string()),
        flag => {
            return Err(DbError::corrupt(
                &field.name,
                format!("invalid null flag {}", flag),
            ))
        }
    }

    let data = &slot[NULL_FLAG_SIZE..NULL_FLAG_SIZE + data_size];
    let value = match field.kind {
        FieldKind::Int => i32::from_ne_bytes(fixed_bytes(field, data)?).to_string(),
        FieldKind::Double => f64::from_ne_bytes(fixed_bytes(field, data)?).to_string(),
        FieldKind::Bool => match data[0] {
            0 => "false".to_string(),
            1 => "true".to_string(),
            other => {
                return Err(DbError::corrupt(
                    &field.name,
                    format!("invalid bool byte {}", other),
                ))
            }
        },
        FieldKind::DateTime => {
            let timestamp = i64::from_ne_bytes(fixed_bytes(field, data)?);
            format_datetime(timestamp).ok_or_else(|| {
                DbError::corrupt(&field.name, format!("timestamp {} out of range", timestamp))
            })?
        }
        FieldKind::Varchar => {
            let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
            std::str::from_utf8(&data[..end])
                .map_err(|e| DbError::corrupt(&field.name, e.to_string()))?
                .to_string()
        }
    };
    Ok(value)
}

fn fixed_bytes<const N: usize>(field: &FieldDescriptor, data: &[u8]) -> Result<[u8; N], DbError> {
    data.get(..N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| DbError::corrupt(&field.name, format!("expected {} payload bytes", N)))
}
