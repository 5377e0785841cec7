//! Mutation log hooks.
//!
//! The database reports every successful row mutation to a [`MutationLog`]
//! after the table file has been written. A transaction manager records
//! these and undoes them through the `rollback_*_by_rowid` primitives.

use std::sync::{Arc, Mutex};

use crate::types::Row;

/// One row mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// A row was appended
    Insert {
        table: String,
        row_id: u64,
        values: Row,
    },
    /// A row was marked deleted
    Delete {
        table: String,
        row_id: u64,
        /// Values at the time of deletion
        values: Row,
    },
    /// A row was rewritten with new values
    Update {
        table: String,
        row_id: u64,
        old_values: Row,
        new_values: Row,
    },
}

impl LogRecord {
    pub fn table(&self) -> &str {
        match self {
            LogRecord::Insert { table, .. }
            | LogRecord::Delete { table, .. }
            | LogRecord::Update { table, .. } => table,
        }
    }

    pub fn row_id(&self) -> u64 {
        match self {
            LogRecord::Insert { row_id, .. }
            | LogRecord::Delete { row_id, .. }
            | LogRecord::Update { row_id, .. } => *row_id,
        }
    }
}

/// Receiver of mutation events.
pub trait MutationLog: Send + Sync {
    fn log_insert(&self, table: &str, row_id: u64, values: &Row);
    fn log_delete(&self, table: &str, row_id: u64, values: &Row);
    fn log_update(&self, table: &str, row_id: u64, old_values: &Row, new_values: &Row);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLog;

impl MutationLog for NullLog {
    fn log_insert(&self, _table: &str, _row_id: u64, _values: &Row) {}
    fn log_delete(&self, _table: &str, _row_id: u64, _values: &Row) {}
    fn log_update(&self, _table: &str, _row_id: u64, _old_values: &Row, _new_values: &Row) {}
}

/// Keeps events in memory. Clones share the same record list.
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records so far, oldest first.
    pub fn records(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Removes and returns every record.
    pub fn drain(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(mut records) => std::mem::take(&mut *records),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, record: LogRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

impl MutationLog for MemoryLog {
    fn log_insert(&self, table: &str, row_id: u64, values: &Row) {
        self.push(LogRecord::Insert {
            table: table.to_string(),
            row_id,
            values: values.clone(),
        });
    }

    fn log_delete(&self, table: &str, row_id: u64, values: &Row) {
        self.push(LogRecord::Delete {
            table: table.to_string(),
            row_id,
            values: values.clone(),
        });
    }

    fn log_update(&self, table: &str, row_id: u64, old_values: &Row, new_values: &Row) {
        self.push(LogRecord::Update {
            table: table.to_string(),
            row_id,
            old_values: old_values.clone(),
            new_values: new_values.clone(),
        });
    }
}
