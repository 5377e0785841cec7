//! Sequential file of fixed-size rows (`.trd`).

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::{RowLayout, ROW_HEADER_SIZE};
use crate::config::RewriteMode;
use crate::error::DbError;
use crate::table::FieldDescriptor;
use crate::types::Row;

use super::io_utils::{classify_io_error, temp_path_for};

/// Locator of a row in a record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordPointer {
    pub row_id: u64,
}

/// A row as stored: header plus decoded values.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub row_id: u64,
    pub deleted: bool,
    pub values: Row,
}

impl StoredRow {
    pub fn live(row_id: u64, values: Row) -> Self {
        Self {
            row_id,
            deleted: false,
            values,
        }
    }
}

/// Append-only row file with whole-file rewrite for update/delete.
#[derive(Debug)]
pub struct RecordStore {
    /// Backing `.trd` file
    path: PathBuf,
    /// Row layout derived from the table's fields
    layout: RowLayout,
    /// Reject over-long Varchar values instead of truncating
    strict_varchar: bool,
    /// fsync after appends and rewrites
    sync_writes: bool,
    /// Row id handed to the next append
    next_row_id: u64,
}

impl RecordStore {
    /// Creates an empty record file, replacing any existing one.
    pub fn create(
        path: impl Into<PathBuf>,
        fields: &[FieldDescriptor],
        strict_varchar: bool,
        sync_writes: bool,
    ) -> Result<Self, DbError> {
        let path = path.into();
        File::create(&path).map_err(|e| classify_io_error(e, "Failed to create table file"))?;
        Ok(Self {
            path,
            layout: RowLayout::new(fields)?,
            strict_varchar,
            sync_writes,
            next_row_id: 1,
        })
    }

    /// Opens an existing record file. A missing file is treated as empty.
    pub fn open(
        path: impl Into<PathBuf>,
        fields: &[FieldDescriptor],
        strict_varchar: bool,
        sync_writes: bool,
    ) -> Result<Self, DbError> {
        let mut store = Self {
            path: path.into(),
            layout: RowLayout::new(fields)?,
            strict_varchar,
            sync_writes,
            next_row_id: 1,
        };
        if !store.path.exists() {
            File::create(&store.path)
                .map_err(|e| classify_io_error(e, "Failed to create table file"))?;
        }
        store.next_row_id = store.max_row_id()? + 1;
        tracing::debug!(
            "Opened record store {} (row size {}, next row id {})",
            store.path.display(),
            store.layout.row_size(),
            store.next_row_id
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    /// Row id the next append will receive.
    pub fn next_row_id(&self) -> u64 {
        self.next_row_id
    }

    /// Encodes and appends a live row at end of file.
    ///
    /// # Returns
    /// The pointer of the new row; its id is one greater than any id in the file.
    pub fn append(&mut self, values: &Row) -> Result<RecordPointer, DbError> {
        let row_id = self.next_row_id;
        let data = self
            .layout
            .encode_row(row_id, false, values, self.strict_varchar)?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| classify_io_error(e, "Failed to open table file for append"))?;
        file.write_all(&data)
            .map_err(|e| classify_io_error(e, "Failed to append row"))?;
        if self.sync_writes {
            file.sync_data()
                .map_err(|e| classify_io_error(e, "Failed to sync table file"))?;
        }

        self.next_row_id += 1;
        Ok(RecordPointer { row_id })
    }

    /// Lazily iterates live rows in file order.
    pub fn scan(&self) -> Result<RowScan<'_>, DbError> {
        self.open_scan(false, None)
    }

    /// Iterates every row, tombstones included.
    pub fn scan_with_deleted(&self) -> Result<RowScan<'_>, DbError> {
        self.open_scan(true, None)
    }

    /// Iterates the live rows whose ids are in `row_ids`; other rows are skipped
    /// without decoding.
    pub fn scan_ids<'a>(&'a self, row_ids: &'a HashSet<u64>) -> Result<RowScan<'a>, DbError> {
        self.open_scan(false, Some(row_ids))
    }

    fn open_scan<'a>(
        &'a self,
        include_deleted: bool,
        only: Option<&'a HashSet<u64>>,
    ) -> Result<RowScan<'a>, DbError> {
        let file = File::open(&self.path)
            .map_err(|e| classify_io_error(e, "Failed to open table file"))?;
        Ok(RowScan {
            reader: BufReader::new(file),
            layout: &self.layout,
            path: &self.path,
            include_deleted,
            only,
            buffer: vec![0u8; self.layout.row_size()],
            done: false,
        })
    }

    /// Looks up a single live row.
    pub fn get(&self, row_id: u64) -> Result<Option<Row>, DbError> {
        let ids = HashSet::from([row_id]);
        match self.scan_ids(&ids)?.next() {
            Some(row) => Ok(Some(row?.values)),
            None => Ok(None),
        }
    }

    /// Largest row id in the file, tombstones included; 0 for an empty file.
    pub fn max_row_id(&self) -> Result<u64, DbError> {
        let mut max = 0;
        for (_, row_id, _) in self.headers()? {
            max = max.max(row_id);
        }
        Ok(max)
    }

    /// Number of live rows.
    pub fn live_count(&self) -> Result<usize, DbError> {
        Ok(self
            .headers()?
            .into_iter()
            .filter(|&(_, _, flag)| flag == 0)
            .count())
    }

    /// Replaces the file contents with `rows`, in order.
    pub fn rewrite(&mut self, rows: &[StoredRow], mode: RewriteMode) -> Result<(), DbError> {
        let mut data = Vec::with_capacity(rows.len() * self.layout.row_size());
        for row in rows {
            data.extend_from_slice(&self.layout.encode_row(
                row.row_id,
                row.deleted,
                &row.values,
                self.strict_varchar,
            )?);
        }

        match mode {
            RewriteMode::Truncate => self.write_truncate(&data)?,
            RewriteMode::AtomicRename => self.write_atomic(&data)?,
        }

        if let Some(max) = rows.iter().map(|r| r.row_id).max() {
            self.next_row_id = self.next_row_id.max(max + 1);
        }
        tracing::debug!(
            "Rewrote {} with {} rows ({} bytes)",
            self.path.display(),
            rows.len(),
            data.len()
        );
        Ok(())
    }

    /// Rewrites every row under a new field layout.
    ///
    /// `convert` maps each stored row's values to the new schema.
    pub fn migrate<F>(
        &mut self,
        fields: &[FieldDescriptor],
        mode: RewriteMode,
        mut convert: F,
    ) -> Result<(), DbError>
    where
        F: FnMut(Row) -> Row,
    {
        let rows = self
            .scan_with_deleted()?
            .map(|row| {
                row.map(|mut row| {
                    row.values = convert(row.values);
                    row
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let old_layout = std::mem::replace(&mut self.layout, RowLayout::new(fields)?);
        if let Err(err) = self.rewrite(&rows, mode) {
            self.layout = old_layout;
            return Err(err);
        }
        Ok(())
    }

    /// Sets the delete flag of one row in place.
    ///
    /// # Returns
    /// `false` if no row with that id exists.
    pub fn set_deleted_flag(&mut self, row_id: u64, deleted: bool) -> Result<bool, DbError> {
        let Some(offset) = self.locate(row_id)? else {
            return Ok(false);
        };
        let mut file = self.open_rw()?;
        file.seek(SeekFrom::Start(offset + 8))
            .map_err(|e| classify_io_error(e, "Failed to seek table file"))?;
        file.write_all(&[u8::from(deleted)])
            .map_err(|e| classify_io_error(e, "Failed to write delete flag"))?;
        self.finish_write(&file)?;
        Ok(true)
    }

    /// Overwrites the values of one row in place, keeping its delete flag.
    ///
    /// # Returns
    /// `false` if no row with that id exists.
    pub fn overwrite(&mut self, row_id: u64, values: &Row) -> Result<bool, DbError> {
        let Some(offset) = self.locate(row_id)? else {
            return Ok(false);
        };
        let mut file = self.open_rw()?;
        let mut header = [0u8; ROW_HEADER_SIZE];
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| classify_io_error(e, "Failed to seek table file"))?;
        file.read_exact(&mut header)
            .map_err(|e| classify_io_error(e, "Failed to read row header"))?;

        let data = self
            .layout
            .encode_row(row_id, header[8] == 1, values, self.strict_varchar)?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| classify_io_error(e, "Failed to seek table file"))?;
        file.write_all(&data)
            .map_err(|e| classify_io_error(e, "Failed to overwrite row"))?;
        self.finish_write(&file)?;
        Ok(true)
    }

    /// Removes the file from disk.
    pub fn remove_file(&self) -> Result<(), DbError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(classify_io_error(e, "Failed to remove table file")),
        }
    }

    /// Reads `(offset, row_id, delete_flag)` for every complete row.
    fn headers(&self) -> Result<Vec<(u64, u64, u8)>, DbError> {
        let file = File::open(&self.path)
            .map_err(|e| classify_io_error(e, "Failed to open table file"))?;
        let mut reader = BufReader::new(file);
        let row_size = self.layout.row_size();
        let mut buffer = vec![0u8; row_size];
        let mut headers = Vec::new();
        let mut offset = 0u64;

        loop {
            let read = read_full(&mut reader, &mut buffer)
                .map_err(|e| classify_io_error(e, "Failed to read table file"))?;
            if read < row_size {
                break;
            }
            if let Some((row_id, flag)) = self.layout.decode_header(&buffer) {
                headers.push((offset, row_id, flag));
            }
            offset += row_size as u64;
        }
        Ok(headers)
    }

    fn locate(&self, row_id: u64) -> Result<Option<u64>, DbError> {
        Ok(self
            .headers()?
            .into_iter()
            .find(|&(_, id, _)| id == row_id)
            .map(|(offset, _, _)| offset))
    }

    fn open_rw(&self) -> Result<File, DbError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| classify_io_error(e, "Failed to open table file for write"))
    }

    fn finish_write(&self, file: &File) -> Result<(), DbError> {
        if self.sync_writes {
            file.sync_data()
                .map_err(|e| classify_io_error(e, "Failed to sync table file"))?;
        }
        Ok(())
    }

    fn write_truncate(&self, data: &[u8]) -> Result<(), DbError> {
        let file = File::create(&self.path)
            .map_err(|e| classify_io_error(e, "Failed to truncate table file"))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(data)
            .map_err(|e| classify_io_error(e, "Failed to write table file"))?;
        let file = writer
            .into_inner()
            .map_err(|e| classify_io_error(e.into_error(), "Failed to flush table file"))?;
        self.finish_write(&file)
    }

    fn write_atomic(&self, data: &[u8]) -> Result<(), DbError> {
        let temp_path = temp_path_for(&self.path);
        let mut file = File::create(&temp_path)
            .map_err(|e| classify_io_error(e, "Failed to create temp table file"))?;
        file.write_all(data)
            .map_err(|e| classify_io_error(e, "Failed to write temp table file"))?;
        file.sync_all()
            .map_err(|e| classify_io_error(e, "Failed to sync temp table file"))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| classify_io_error(e, "Failed to rename table file"))?;
        Ok(())
    }
}

/// Lazy iterator over the rows of a record store.
///
/// The stream ends at end of file, at a short trailing row, or at a row whose
/// delete flag is neither 0 nor 1.
pub struct RowScan<'a> {
    reader: BufReader<File>,
    layout: &'a RowLayout,
    path: &'a Path,
    include_deleted: bool,
    only: Option<&'a HashSet<u64>>,
    buffer: Vec<u8>,
    done: bool,
}

impl Iterator for RowScan<'_> {
    type Item = Result<StoredRow, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let read = match read_full(&mut self.reader, &mut self.buffer) {
                Ok(read) => read,
                Err(e) => {
                    self.done = true;
                    return Some(Err(classify_io_error(e, "Failed to read table file")));
                }
            };
            if read < self.buffer.len() {
                if read > 0 {
                    tracing::warn!(
                        "Ignoring {} trailing bytes in {}",
                        read,
                        self.path.display()
                    );
                }
                self.done = true;
                break;
            }

            let (row_id, flag) = self.layout.decode_header(&self.buffer)?;
            let deleted = match flag {
                0 => false,
                1 => true,
                other => {
                    tracing::warn!(
                        "Row {} in {} has delete flag {}, ending scan",
                        row_id,
                        self.path.display(),
                        other
                    );
                    self.done = true;
                    break;
                }
            };

            if deleted && !self.include_deleted {
                continue;
            }
            if let Some(only) = self.only {
                if !only.contains(&row_id) {
                    continue;
                }
            }

            return Some(
                self.layout
                    .decode_values(&self.buffer)
                    .map(|values| StoredRow {
                        row_id,
                        deleted,
                        values,
                    })
                    .map_err(|e| match e {
                        DbError::CorruptRecord { detail, .. } => DbError::CorruptRecord {
                            source_name: self.path.display().to_string(),
                            detail: format!("row {}: {}", row_id, detail),
                        },
                        other => other,
                    }),
            );
        }
        None
    }
}

/// Reads until `buf` is full or end of file; returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
