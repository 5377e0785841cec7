//! File-per-table relational storage engine.
//!
//! Provides the binary record codec, record files, secondary B-tree indexes,
//! the constraint engine and query evaluation.

pub mod codec;
pub mod config;
pub mod constraints;
pub mod database;
pub mod error;
pub mod expr;
pub mod index;
pub mod log;
pub mod query;
pub mod storage;
pub mod table;
pub mod types;

pub use config::{DbConfig, RewriteMode};
pub use database::Database;
pub use error::{DbError, ErrorKind};
pub use log::{LogRecord, MemoryLog, MutationLog, NullLog};
pub use query::{JoinSpec, QueryResult, SelectQuery};
pub use storage::RecordPointer;
pub use table::{ConstraintDescriptor, ConstraintKind, FieldDescriptor, Table};
pub use types::{FieldKind, Row, NULL};
