//! `catalog.json`: which tables exist, when each was last modified and which
//! indexes it carries.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::DbConfig;
use crate::error::DbError;
use crate::index::IndexDescriptor;
use crate::storage::io_utils::{classify_io_error, retry_io_operation, temp_path_for};

const CATALOG_FILE: &str = "catalog.json";
const CATALOG_VERSION: u32 = 1;

/// Catalog file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: u32,
    pub tables: Vec<TableEntry>,
}

/// One catalogued table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub name: String,
    pub last_modified: i64,
    #[serde(default)]
    pub indexes: Vec<IndexDescriptor>,
}

impl Catalog {
    pub fn new(tables: Vec<TableEntry>) -> Self {
        Self {
            version: CATALOG_VERSION,
            tables,
        }
    }
}

fn catalog_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CATALOG_FILE)
}

/// Reads the catalog; an absent file is an empty catalog.
pub fn load(config: &DbConfig) -> Result<Catalog, DbError> {
    let path = catalog_path(&config.data_dir);
    if !path.exists() {
        return Ok(Catalog::new(Vec::new()));
    }

    let contents = retry_io_operation(
        || fs::read_to_string(&path).map_err(|e| classify_io_error(e, "Failed to read catalog")),
        config.persistence_max_retries,
        config.persistence_retry_delay_ms,
        "load_catalog",
    )?;
    let catalog: Catalog = serde_json::from_str(&contents)
        .map_err(|e| DbError::SerializationError(format!("Failed to parse catalog: {}", e)))?;
    if catalog.version != CATALOG_VERSION {
        return Err(DbError::SerializationError(format!(
            "Unsupported catalog version {}",
            catalog.version
        )));
    }
    Ok(catalog)
}

/// Writes the catalog through a temporary file and rename.
pub fn save(config: &DbConfig, catalog: &Catalog) -> Result<(), DbError> {
    retry_io_operation(
        || save_internal(&config.data_dir, catalog),
        config.persistence_max_retries,
        config.persistence_retry_delay_ms,
        "save_catalog",
    )
}

fn save_internal(data_dir: &Path, catalog: &Catalog) -> Result<(), DbError> {
    let json = serde_json::to_string_pretty(catalog)
        .map_err(|e| DbError::SerializationError(e.to_string()))?;

    let final_path = catalog_path(data_dir);
    let temp_path = temp_path_for(&final_path);

    fs::create_dir_all(data_dir)
        .map_err(|e| classify_io_error(e, "Failed to create data directory"))?;

    let mut file = File::create(&temp_path)
        .map_err(|e| classify_io_error(e, "Failed to create temp catalog file"))?;
    file.write_all(json.as_bytes())
        .map_err(|e| classify_io_error(e, "Failed to write catalog"))?;
    file.sync_all()
        .map_err(|e| classify_io_error(e, "Failed to sync catalog"))?;

    fs::rename(&temp_path, &final_path)
        .map_err(|e| classify_io_error(e, "Failed to rename catalog file"))?;
    Ok(())
}
