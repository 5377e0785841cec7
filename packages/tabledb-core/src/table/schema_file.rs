//! `.tdf` and `.tic` schema files: sequential fixed-size descriptor structs.
//!
//! Field record (160 bytes):
//! `order: i32 | name: [u8; 128] | kind: i32 | param: i32 | pad: 4 | last_modified: i64 |
//! integrity_flag: i32 | pad: 4`
//!
//! Constraint record (516 bytes):
//! `name: [u8; 128] | field: [u8; 128] | kind: i32 | param: [u8; 256]`
//!
//! Strings are NUL-terminated; integers use native endianness.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use super::constraint::{ConstraintDescriptor, ConstraintKind};
use super::field::FieldDescriptor;
use crate::error::DbError;
use crate::storage::io_utils::{classify_io_error, temp_path_for};
use crate::types::FieldKind;

pub const FIELD_RECORD_SIZE: usize = 160;
pub const CONSTRAINT_RECORD_SIZE: usize = 516;

const NAME_WIDTH: usize = 128;
const PARAM_WIDTH: usize = 256;

/// Longest constraint parameter that fits a `.tic` record, in bytes.
pub const MAX_PARAM_LEN: usize = PARAM_WIDTH - 1;

/// Writes all field descriptors, replacing the file.
pub fn write_fields(path: &Path, fields: &[FieldDescriptor]) -> Result<(), DbError> {
    let mut data = Vec::with_capacity(fields.len() * FIELD_RECORD_SIZE);
    for field in fields {
        data.extend_from_slice(&field.order.to_ne_bytes());
        put_str(&mut data, &field.name, NAME_WIDTH, "field name")?;
        data.extend_from_slice(&field.kind.code().to_ne_bytes());
        let param = i32::try_from(field.param).map_err(|_| DbError::InvalidField {
            field: field.name.clone(),
            reason: format!("width {} too large", field.param),
        })?;
        data.extend_from_slice(&param.to_ne_bytes());
        data.extend_from_slice(&[0u8; 4]);
        data.extend_from_slice(&field.last_modified.to_ne_bytes());
        data.extend_from_slice(&field.integrity_flag.to_ne_bytes());
        data.extend_from_slice(&[0u8; 4]);
    }
    replace_file(path, &data)
}

/// Reads all field descriptors.
pub fn read_fields(path: &Path) -> Result<Vec<FieldDescriptor>, DbError> {
    let data = read_records(path, FIELD_RECORD_SIZE)?;
    let source = path.display().to_string();

    data.chunks_exact(FIELD_RECORD_SIZE)
        .map(|record| {
            let kind_code = get_i32(&record[132..136]);
            let kind = FieldKind::from_code(kind_code).ok_or_else(|| {
                DbError::corrupt(&source, format!("unknown field kind {}", kind_code))
            })?;
            let param = get_i32(&record[136..140]);
            Ok(FieldDescriptor {
                order: get_i32(&record[0..4]),
                name: get_str(&record[4..132], &source)?,
                kind,
                param: usize::try_from(param).map_err(|_| {
                    DbError::corrupt(&source, format!("negative field width {}", param))
                })?,
                last_modified: get_i64(&record[144..152]),
                integrity_flag: get_i32(&record[152..156]),
            })
        })
        .collect()
}

/// Writes all constraint descriptors, replacing the file.
pub fn write_constraints(path: &Path, constraints: &[ConstraintDescriptor]) -> Result<(), DbError> {
    let mut data = Vec::with_capacity(constraints.len() * CONSTRAINT_RECORD_SIZE);
    for constraint in constraints {
        put_str(&mut data, &constraint.name, NAME_WIDTH, "constraint name")?;
        put_str(&mut data, &constraint.field, NAME_WIDTH, "constraint field")?;
        data.extend_from_slice(&constraint.kind.code().to_ne_bytes());
        put_str(&mut data, &constraint.param, PARAM_WIDTH, "constraint parameter")?;
    }
    replace_file(path, &data)
}

/// Reads all constraint descriptors.
pub fn read_constraints(path: &Path) -> Result<Vec<ConstraintDescriptor>, DbError> {
    let data = read_records(path, CONSTRAINT_RECORD_SIZE)?;
    let source = path.display().to_string();

    data.chunks_exact(CONSTRAINT_RECORD_SIZE)
        .map(|record| {
            let kind_code = get_i32(&record[256..260]);
            let kind = ConstraintKind::from_code(kind_code).ok_or_else(|| {
                DbError::corrupt(&source, format!("unknown constraint kind {}", kind_code))
            })?;
            Ok(ConstraintDescriptor {
                name: get_str(&record[0..128], &source)?,
                field: get_str(&record[128..256], &source)?,
                kind,
                param: get_str(&record[260..516], &source)?,
            })
        })
        .collect()
}

fn read_records(path: &Path, record_size: usize) -> Result<Vec<u8>, DbError> {
    let data = fs::read(path)
        .map_err(|e| classify_io_error(e, &format!("Failed to read {}", path.display())))?;
    if data.len() % record_size != 0 {
        return Err(DbError::corrupt(
            path.display().to_string(),
            format!(
                "file length {} is not a multiple of {}",
                data.len(),
                record_size
            ),
        ));
    }
    Ok(data)
}

fn replace_file(path: &Path, data: &[u8]) -> Result<(), DbError> {
    let temp_path = temp_path_for(path);

    let mut file = File::create(&temp_path)
        .map_err(|e| classify_io_error(e, "Failed to create temp schema file"))?;
    file.write_all(data)
        .map_err(|e| classify_io_error(e, "Failed to write schema file"))?;
    file.sync_all()
        .map_err(|e| classify_io_error(e, "Failed to sync schema file"))?;

    fs::rename(&temp_path, path)
        .map_err(|e| classify_io_error(e, "Failed to rename schema file"))?;
    Ok(())
}

fn put_str(data: &mut Vec<u8>, value: &str, width: usize, what: &str) -> Result<(), DbError> {
    let bytes = value.as_bytes();
    if bytes.len() >= width {
        return Err(DbError::InvalidField {
            field: value.to_string(),
            reason: format!("{} longer than {} bytes", what, width - 1),
        });
    }
    let start = data.len();
    data.extend_from_slice(bytes);
    data.resize(start + width, 0);
    Ok(())
}

fn get_str(bytes: &[u8], source: &str) -> Result<String, DbError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end])
        .map(str::to_string)
        .map_err(|e| DbError::corrupt(source, e.to_string()))
}

fn get_i32(bytes: &[u8]) -> i32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    i32::from_ne_bytes(buf)
}

fn get_i64(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    i64::from_ne_bytes(buf)
}
