//! Record files and the I/O helpers shared by everything that touches disk.

pub mod io_utils;
mod record_store;

pub use record_store::{RecordPointer, RecordStore, RowScan, StoredRow};
