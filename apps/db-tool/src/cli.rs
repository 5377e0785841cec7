use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Data directory holding the catalog and table files
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List tables with their live row counts and indexes
    Tables,

    /// Show a table's fields and constraints
    Schema {
        /// Table name
        table: String,
    },

    /// Print every row of a table in file order
    Dump {
        /// Table name
        table: String,

        /// Include rows marked deleted
        #[arg(long)]
        deleted: bool,
    },

    /// Run a query against one table
    Select {
        /// Table name
        table: String,

        /// Columns to show (comma-separated, default all)
        #[arg(short, long)]
        columns: Option<String>,

        /// WHERE condition, e.g. "age > 30 AND name = 'ann'"
        #[arg(short, long = "where")]
        condition: Option<String>,

        /// GROUP BY column
        #[arg(long)]
        group_by: Option<String>,

        /// ORDER BY column, optionally followed by ASC or DESC
        #[arg(long)]
        order_by: Option<String>,
    },

    /// Remove deleted rows from a table file
    Compact {
        /// Table name
        table: String,
    },

    /// Rebuild a table's indexes from its rows
    Reindex {
        /// Table name
        table: String,
    },

    /// Check that every index tree is well formed and matches its table
    CheckIndexes,
}
