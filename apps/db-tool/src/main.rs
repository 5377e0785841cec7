//! CLI tool for schema inspection, data dumps and table maintenance.
//!
//! Provides commands for:
//! - Listing tables and showing their schema
//! - Dumping rows, including deleted ones
//! - Running single-table queries
//! - Compacting table files, rebuilding indexes and checking their consistency

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use tabledb_core::{Database, DbConfig, QueryResult, SelectQuery, Table};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut db = Database::open(DbConfig::with_data_dir(&cli.data_dir))
        .with_context(|| format!("Failed to open database in {}", cli.data_dir.display()))?;
    tracing::debug!(
        "Opened {} with {} tables",
        cli.data_dir.display(),
        db.table_names().len()
    );

    match cli.command {
        Commands::Tables => list_tables(&db),
        Commands::Schema { table } => show_schema(db.table(&table)?),
        Commands::Dump { table, deleted } => dump(db.table(&table)?, deleted),
        Commands::Select {
            table,
            columns,
            condition,
            group_by,
            order_by,
        } => {
            let mut query = SelectQuery::new(table);
            if let Some(columns) = columns {
                query = query.columns(columns.split(',').map(str::trim));
            }
            if let Some(condition) = condition {
                query = query.filter(condition);
            }
            if let Some(group_by) = group_by {
                query = query.group_by(group_by);
            }
            if let Some(order_by) = order_by {
                query = query.order_by(order_by);
            }
            print_result(&db.select(&query)?);
            Ok(())
        }
        Commands::Compact { table } => {
            let removed = db.compact(&table)?;
            println!("Removed {} deleted rows from '{}'", removed, table);
            Ok(())
        }
        Commands::Reindex { table } => {
            db.reindex(&table)?;
            println!("Rebuilt {} indexes of '{}'", db.table(&table)?.indexes().len(), table);
            Ok(())
        }
        Commands::CheckIndexes => check_indexes(&db),
    }
}

fn list_tables(db: &Database) -> Result<()> {
    for name in db.table_names() {
        let table = db.table(&name)?;
        let indexes: Vec<&str> = table.indexes().iter().map(|i| i.name()).collect();
        println!(
            "{}\t{} rows\tindexes: [{}]",
            name,
            table.row_count()?,
            indexes.join(", ")
        );
    }
    Ok(())
}

fn show_schema(table: &Table) -> Result<()> {
    println!("Table '{}'", table.name);
    for field in &table.fields {
        println!(
            "  {:<3} {:<24} {:?}({})",
            field.order, field.name, field.kind, field.param
        );
    }
    for constraint in &table.constraints {
        let target = if constraint.is_table_level() {
            "<table>"
        } else {
            constraint.field.as_str()
        };
        println!(
            "  {:<24} {:?} on {} {}",
            constraint.name, constraint.kind, target, constraint.param
        );
    }
    for index in table.indexes() {
        println!(
            "  index {} ({})",
            index.name(),
            index.descriptor().fields.join(", ")
        );
    }
    Ok(())
}

fn dump(table: &Table, include_deleted: bool) -> Result<()> {
    let columns = table.field_names();
    println!("row_id\t{}", columns.join("\t"));
    let rows = if include_deleted {
        table.rows_with_deleted()?
    } else {
        table.rows()?
    };
    for row in rows {
        let values: Vec<&str> = columns
            .iter()
            .map(|c| row.values.get(c).map(String::as_str).unwrap_or(tabledb_core::NULL))
            .collect();
        let marker = if row.deleted { " (deleted)" } else { "" };
        println!("{}{}\t{}", row.row_id, marker, values.join("\t"));
    }
    Ok(())
}

fn print_result(result: &QueryResult) {
    println!("{}", result.columns.join("\t"));
    for row in &result.rows {
        let values: Vec<&str> = result
            .columns
            .iter()
            .map(|c| row.get(c).map(String::as_str).unwrap_or(tabledb_core::NULL))
            .collect();
        println!("{}", values.join("\t"));
    }
    println!("({} rows)", result.len());
}

fn check_indexes(db: &Database) -> Result<()> {
    let mut failures = 0;
    for name in db.table_names() {
        let table = db.table(&name)?;
        let rows = table.rows()?;
        for index in table.indexes() {
            let expected = rows
                .iter()
                .filter(|row| index.value_of(&row.values).is_some())
                .count();
            match index.tree().validate() {
                Ok(entries) if entries == expected => {
                    println!("{}.{}: ok ({} entries)", name, index.name(), entries)
                }
                Ok(entries) => {
                    failures += 1;
                    println!(
                        "{}.{}: {} entries for {} indexed rows",
                        name,
                        index.name(),
                        entries,
                        expected
                    );
                }
                Err(reason) => {
                    failures += 1;
                    println!("{}.{}: {}", name, index.name(), reason);
                }
            }
        }
    }
    if failures > 0 {
        bail!("{} index checks failed", failures);
    }
    Ok(())
}
