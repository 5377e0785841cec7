//! Integration tests for tabledb-core.
//!
//! Each submodule drives the public `Database` API against a temporary data
//! directory:
//! - `scenario_tests`: constraint, index and query behaviour end to end
//! - `persistence_tests`: reopening a data directory and file-level guarantees
//! - `schema_evolution_tests`: adding, dropping and renaming fields
//! - `rollback_tests`: row-level undo primitives and compaction

pub mod helpers;
pub mod persistence_tests;
pub mod rollback_tests;
pub mod scenario_tests;
pub mod schema_evolution_tests;
