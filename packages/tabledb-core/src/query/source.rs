//! Row sources: filtered single-table scans and nested-loop joins.

use std::collections::HashSet;

use crate::constraints::Tables;
use crate::error::DbError;
use crate::storage::StoredRow;
use crate::table::Table;
use crate::types::{is_null, values_equal, Row};

use super::condition::{BoundCondition, Condition, Connector};
use super::schema::Schema;
use super::{JoinSpec, SelectQuery};

/// Live rows of `table` satisfying `condition`, in file order.
///
/// A single-column index answers `field OP literal` clauses: candidates are
/// intersected when every connector is AND, and united when every connector
/// is OR and every clause is indexable. The full condition is re-evaluated on
/// the candidates either way.
pub fn filter_table(table: &Table, condition: Option<&Condition>) -> Result<Vec<StoredRow>, DbError> {
    let Some(condition) = condition else {
        return table.rows();
    };
    let bound = condition.bind(&Schema::single(table))?;

    let rows: Vec<StoredRow> = match index_candidates(table, &bound) {
        Some(candidates) => {
            tracing::debug!(
                "Using index on '{}': {} candidate rows",
                table.name,
                candidates.len()
            );
            table.store().scan_ids(&candidates)?.collect::<Result<_, _>>()?
        }
        None => {
            tracing::debug!("Full scan of '{}'", table.name);
            table.rows()?
        }
    };

    Ok(rows
        .into_iter()
        .filter(|row| bound.evaluate(&row.values))
        .collect())
}

/// Candidate row ids from indexes, or `None` when a full scan is needed.
fn index_candidates(table: &Table, condition: &BoundCondition) -> Option<HashSet<u64>> {
    let lookups: Vec<Option<HashSet<u64>>> = condition
        .predicates()
        .map(|predicate| {
            let (column, op, literal) = predicate.column_vs_literal()?;
            table.index_on(column)?.lookup(op, literal)
        })
        .collect();

    if condition.all_connectors(Connector::And) {
        lookups.into_iter().flatten().reduce(|acc, ids| {
            acc.intersection(&ids).copied().collect()
        })
    } else if condition.all_connectors(Connector::Or) {
        let mut union = HashSet::new();
        for ids in lookups {
            union.extend(ids?);
        }
        Some(union)
    } else {
        None
    }
}

/// Source rows of a multi-table query with `table.field` keys.
///
/// Tables listed in `FROM` form a Cartesian product; each join then extends
/// every row with the matching rows of its table.
pub fn assemble(tables: &Tables, query: &SelectQuery, schema: &Schema) -> Result<Vec<Row>, DbError> {
    let mut rows: Vec<Row> = vec![Row::new()];

    for name in &query.tables {
        let table = lookup(tables, name)?;
        let right = prefixed_rows(table)?;
        let mut product = Vec::with_capacity(rows.len() * right.len());
        for left in &rows {
            for r in &right {
                let mut combined = left.clone();
                combined.extend(r.iter().map(|(k, v)| (k.clone(), v.clone())));
                product.push(combined);
            }
        }
        rows = product;
    }

    for join in &query.joins {
        rows = join_step(tables, rows, join, schema)?;
    }
    Ok(rows)
}

fn join_step(
    tables: &Tables,
    rows: Vec<Row>,
    join: &JoinSpec,
    schema: &Schema,
) -> Result<Vec<Row>, DbError> {
    let table = lookup(tables, &join.table)?;
    let right = prefixed_rows(table)?;
    let conditions = join
        .on
        .iter()
        .map(|(l, r)| {
            let left = schema.resolve(l)?;
            let right = schema.resolve(r)?;
            let kind = schema.kind(&left).or(schema.kind(&right));
            Ok((left, right, kind))
        })
        .collect::<Result<Vec<_>, DbError>>()?;

    let mut joined = Vec::new();
    for left in &rows {
        for r in &right {
            let mut combined = left.clone();
            combined.extend(r.iter().map(|(k, v)| (k.clone(), v.clone())));
            let matches = conditions.iter().all(|(l, r, kind)| {
                match (combined.get(l), combined.get(r)) {
                    (Some(a), Some(b)) => !is_null(a) && values_equal(*kind, a, b),
                    _ => false,
                }
            });
            if matches {
                joined.push(combined);
            }
        }
    }
    tracing::debug!(
        "Joined '{}': {} x {} -> {} rows",
        join.table,
        rows.len(),
        right.len(),
        joined.len()
    );
    Ok(joined)
}

fn prefixed_rows(table: &Table) -> Result<Vec<Row>, DbError> {
    Ok(table
        .rows()?
        .into_iter()
        .map(|row| {
            row.values
                .into_iter()
                .map(|(k, v)| (format!("{}.{}", table.name, k), v))
                .collect()
        })
        .collect())
}

pub(crate) fn lookup<'a>(tables: &'a Tables, name: &str) -> Result<&'a Table, DbError> {
    tables.get(name).ok_or_else(|| DbError::TableNotFound {
        table: name.to_string(),
    })
}
