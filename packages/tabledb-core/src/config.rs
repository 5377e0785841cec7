//! Database configuration.

use std::path::PathBuf;

/// How the record store replaces a table file during update/delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RewriteMode {
    /// Truncate the table file and write the new contents in place.
    ///
    /// A crash mid-write leaves a truncated `.trd` file.
    #[default]
    Truncate,
    /// Write a sibling `.tmp` file, sync it, then rename it over the table file.
    AtomicRename,
}

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Directory holding the catalog and every table's files
    pub data_dir: PathBuf,
    /// Strategy for whole-file rewrites
    pub rewrite_mode: RewriteMode,
    /// Reject Varchar values longer than the declared length instead of truncating
    pub strict_varchar: bool,
    /// fsync table files after appends and rewrites
    pub sync_writes: bool,
    /// Maximum retry attempts for transient I/O errors
    pub persistence_max_retries: u32,
    /// Delay between retry attempts in milliseconds
    pub persistence_retry_delay_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            rewrite_mode: RewriteMode::Truncate,
            strict_varchar: false,
            sync_writes: false,
            persistence_max_retries: 3,      // Default retry attempts
            persistence_retry_delay_ms: 100, // 100ms delay between retries
        }
    }
}

impl DbConfig {
    /// Creates a configuration rooted at `data_dir` with default settings.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Path prefix for a table's files (`<data_dir>/<table>`).
    pub fn table_path_prefix(&self, table: &str) -> PathBuf {
        self.data_dir.join(table)
    }
}
