//! Query evaluation over decoded rows.
//!
//! A query runs in fixed stages: source assembly (scan, Cartesian product,
//! joins), WHERE filtering, grouping and aggregates, HAVING, ORDER BY, and
//! finally projection.

mod aggregate;
mod condition;
mod order;
mod schema;
mod source;

pub use aggregate::{Aggregate, AggregateFn};
pub use condition::{BoundCondition, BoundPredicate, Condition, Connector, Operand, Predicate};
pub use order::OrderBy;
pub use schema::Schema;

pub(crate) use source::{filter_table, lookup};

use crate::constraints::Tables;
use crate::error::DbError;
use crate::types::{Row, NULL};

/// Joins one more table on `left = right` column equalities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub table: String,
    /// `(table.field, table.field)` pairs that must be equal
    pub on: Vec<(String, String)>,
}

/// A SELECT statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
    /// Projected columns; empty or `*` selects everything
    pub columns: Vec<String>,
    /// FROM tables; more than one forms a Cartesian product
    pub tables: Vec<String>,
    pub condition: Option<String>,
    pub joins: Vec<JoinSpec>,
    pub group_by: Vec<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
}

impl SelectQuery {
    /// `SELECT * FROM table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            tables: vec![table.into()],
            ..Default::default()
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a table to the FROM list.
    pub fn and_table(mut self, table: impl Into<String>) -> Self {
        self.tables.push(table.into());
        self
    }

    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// `JOIN table ON left = right`.
    pub fn join(
        mut self,
        table: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.joins.push(JoinSpec {
            table: table.into(),
            on: vec![(left.into(), right.into())],
        });
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    pub fn having(mut self, condition: impl Into<String>) -> Self {
        self.having = Some(condition.into());
        self
    }

    /// `column [ASC|DESC]`.
    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.order_by = Some(order.into());
        self
    }

    fn is_wildcard(&self) -> bool {
        self.columns.iter().all(|c| c.trim() == "*")
    }
}

/// Rows produced by a SELECT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column across the result, NULL where absent.
    pub fn values(&self, column: &str) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.get(column).map(String::as_str).unwrap_or(NULL))
            .collect()
    }
}

/// Evaluates a query against the given tables.
///
/// # Returns
/// `Err(DbError::TableNotFound)` for an unknown source table,
/// `Err(DbError::FieldNotFound)` or `Err(DbError::AmbiguousColumn)` when a
/// condition, group-by, aggregate or sort column does not resolve, and
/// `Err(DbError::InvalidExpression)` for unparsable clauses.
pub fn execute(tables: &Tables, query: &SelectQuery) -> Result<QueryResult, DbError> {
    let Some(first) = query.tables.first() else {
        return Err(DbError::invalid_expression("", "query names no table"));
    };
    let condition = query.condition.as_deref().map(Condition::parse).transpose()?;
    let having = query
        .having
        .as_deref()
        .map(Condition::parse_single)
        .transpose()?;
    let order = query.order_by.as_deref().map(OrderBy::parse).transpose()?;

    let (mut schema, mut rows) = if query.tables.len() == 1 && query.joins.is_empty() {
        let table = lookup(tables, first)?;
        let rows: Vec<Row> = filter_table(table, condition.as_ref())?
            .into_iter()
            .map(|row| row.values)
            .collect();
        (Schema::single(table), rows)
    } else {
        let sources = query
            .tables
            .iter()
            .chain(query.joins.iter().map(|join| &join.table))
            .map(|name| lookup(tables, name))
            .collect::<Result<Vec<_>, _>>()?;
        let schema = Schema::prefixed(sources);
        let mut rows = source::assemble(tables, query, &schema)?;
        if let Some(condition) = &condition {
            let bound = condition.bind(&schema)?;
            rows.retain(|row| bound.evaluate(row));
        }
        (schema, rows)
    };

    let aggregates = collect_aggregates(query, having.as_ref(), order.as_ref());
    if !query.group_by.is_empty() || !aggregates.is_empty() {
        let (grouped, grouped_schema) =
            aggregate::group_rows(rows, &schema, &query.group_by, &aggregates)?;
        rows = grouped;
        schema = grouped_schema;
    }

    if let Some(having) = &having {
        let bound = having.bind(&schema)?;
        rows.retain(|row| bound.evaluate(row));
    }

    if let Some(order) = &order {
        let key = schema.resolve(&order.column)?;
        order::sort_rows(&mut rows, &key, order.descending);
    }

    let result = project(query, &schema, rows)?;
    tracing::debug!(
        "Query on [{}] returned {} rows",
        query.tables.join(", "),
        result.len()
    );
    Ok(result)
}

/// Aggregates named in the select list, the HAVING clause or the sort key,
/// deduplicated.
fn collect_aggregates(
    query: &SelectQuery,
    having: Option<&Condition>,
    order: Option<&OrderBy>,
) -> Vec<Aggregate> {
    let having_columns = having
        .into_iter()
        .flat_map(|condition| condition.predicates())
        .flat_map(|predicate| [&predicate.left, &predicate.right])
        .filter_map(|operand| match operand {
            Operand::Column(column) => Some(column.as_str()),
            _ => None,
        });

    let mut aggregates: Vec<Aggregate> = Vec::new();
    let sort_column = order.map(|order| order.column.as_str());
    for expr in query
        .columns
        .iter()
        .map(String::as_str)
        .chain(having_columns)
        .chain(sort_column)
    {
        if let Some(aggregate) = Aggregate::parse(expr) {
            if !aggregates.contains(&aggregate) {
                aggregates.push(aggregate);
            }
        }
    }
    aggregates
}

fn project(query: &SelectQuery, schema: &Schema, rows: Vec<Row>) -> Result<QueryResult, DbError> {
    if query.is_wildcard() {
        let columns = match rows.first() {
            Some(row) => row.keys().cloned().collect(),
            None => schema.columns().to_vec(),
        };
        return Ok(QueryResult { columns, rows });
    }

    let keys = query
        .columns
        .iter()
        .map(|column| match Aggregate::parse(column) {
            Some(aggregate) => Ok(Some(aggregate.label())),
            None => schema.try_resolve(column.trim()),
        })
        .collect::<Result<Vec<_>, DbError>>()?;

    let rows = rows
        .iter()
        .map(|row| {
            query
                .columns
                .iter()
                .zip(&keys)
                .map(|(column, key)| {
                    let value = key
                        .as_ref()
                        .and_then(|key| row.get(key))
                        .cloned()
                        .unwrap_or_else(|| NULL.to_string());
                    (column.clone(), value)
                })
                .collect()
        })
        .collect();

    Ok(QueryResult {
        columns: query.columns.clone(),
        rows,
    })
}
