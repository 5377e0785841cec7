//! GROUP BY partitioning and the COUNT/SUM/AVG/MAX/MIN aggregates.

use std::collections::HashMap;

use crate::error::DbError;
use crate::types::{compare_values, is_null, FieldKind, Row, NULL};

use super::schema::Schema;

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateFn {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(Self::Count),
            "SUM" => Some(Self::Sum),
            "AVG" => Some(Self::Avg),
            "MAX" => Some(Self::Max),
            "MIN" => Some(Self::Min),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Max => "MAX",
            Self::Min => "MIN",
        }
    }
}

/// An aggregate call `FUNC(arg)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub func: AggregateFn,
    /// Column reference, or `*` (COUNT only)
    pub arg: String,
}

impl Aggregate {
    /// Recognizes `FUNC(arg)`; anything else is `None`.
    pub fn parse(expr: &str) -> Option<Self> {
        let expr = expr.trim();
        let open = expr.find('(')?;
        let func = AggregateFn::from_name(expr[..open].trim())?;
        let arg = expr[open + 1..].strip_suffix(')')?.trim();
        if arg.is_empty() || (arg == "*" && func != AggregateFn::Count) {
            return None;
        }
        Some(Self {
            func,
            arg: arg.to_string(),
        })
    }

    /// Column label of the result, e.g. `COUNT(*)` or `SUM(salary)`.
    pub fn label(&self) -> String {
        format!("{}({})", self.func.name(), self.arg)
    }

    fn bind(&self, schema: &Schema) -> Result<BoundAggregate, DbError> {
        let column = if self.arg == "*" {
            None
        } else {
            Some(schema.resolve(&self.arg)?)
        };
        let kind = column.as_deref().and_then(|c| schema.kind(c));
        Ok(BoundAggregate {
            label: self.label(),
            func: self.func,
            column,
            kind,
        })
    }
}

struct BoundAggregate {
    label: String,
    func: AggregateFn,
    column: Option<String>,
    kind: Option<FieldKind>,
}

impl BoundAggregate {
    fn result_kind(&self) -> Option<FieldKind> {
        match self.func {
            AggregateFn::Count => Some(FieldKind::Int),
            AggregateFn::Avg => Some(FieldKind::Double),
            AggregateFn::Sum if self.kind == Some(FieldKind::Int) => Some(FieldKind::Int),
            AggregateFn::Sum => Some(FieldKind::Double),
            AggregateFn::Max | AggregateFn::Min => self.kind,
        }
    }

    /// Aggregate over one group. NULLs are skipped; an empty input gives
    /// `0` for COUNT and NULL otherwise.
    fn compute(&self, rows: &[Row]) -> String {
        let Some(column) = &self.column else {
            return rows.len().to_string();
        };
        let values: Vec<&str> = rows
            .iter()
            .filter_map(|row| row.get(column))
            .map(String::as_str)
            .filter(|v| !is_null(v))
            .collect();

        match self.func {
            AggregateFn::Count => values.len().to_string(),
            _ if values.is_empty() => NULL.to_string(),
            AggregateFn::Sum if self.kind == Some(FieldKind::Int) => values
                .iter()
                .filter_map(|v| v.trim().parse::<i64>().ok())
                .sum::<i64>()
                .to_string(),
            AggregateFn::Sum => numbers(&values).sum::<f64>().to_string(),
            AggregateFn::Avg => {
                let numbers: Vec<f64> = numbers(&values).collect();
                if numbers.is_empty() {
                    return NULL.to_string();
                }
                (numbers.iter().sum::<f64>() / numbers.len() as f64).to_string()
            }
            AggregateFn::Max => values
                .iter()
                .copied()
                .max_by(|a, b| compare_values(self.kind, a, b))
                .unwrap_or(NULL)
                .to_string(),
            AggregateFn::Min => values
                .iter()
                .copied()
                .min_by(|a, b| compare_values(self.kind, a, b))
                .unwrap_or(NULL)
                .to_string(),
        }
    }
}

fn numbers<'a>(values: &'a [&'a str]) -> impl Iterator<Item = f64> + 'a {
    values.iter().filter_map(|v| v.trim().parse::<f64>().ok())
}

/// Partitions rows by the group-by columns and computes aggregates.
///
/// Groups keep first-seen order. Each output row is the group's first row
/// plus one column per aggregate label; NULL key values group together under
/// `"NULL"`. Without group-by columns every row forms one group, which
/// exists even when there are no rows.
///
/// # Returns
/// The grouped rows and the schema extended with the aggregate columns.
pub(crate) fn group_rows(
    rows: Vec<Row>,
    schema: &Schema,
    group_by: &[String],
    aggregates: &[Aggregate],
) -> Result<(Vec<Row>, Schema), DbError> {
    let keys = group_by
        .iter()
        .map(|column| schema.resolve(column))
        .collect::<Result<Vec<_>, _>>()?;
    let bound = aggregates
        .iter()
        .map(|aggregate| aggregate.bind(schema))
        .collect::<Result<Vec<_>, _>>()?;

    let mut order: Vec<Vec<String>> = Vec::new();
    let mut groups: HashMap<Vec<String>, Vec<Row>> = HashMap::new();
    for row in rows {
        let key = group_key(&row, &keys);
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row);
    }
    if keys.is_empty() && order.is_empty() {
        order.push(Vec::new());
    }

    let mut grouped_schema = schema.clone();
    for aggregate in &bound {
        grouped_schema.push(aggregate.label.clone(), aggregate.result_kind());
    }

    let grouped: Vec<Row> = order
        .into_iter()
        .map(|key| {
            let members = groups.remove(&key).unwrap_or_default();
            let mut row = members.first().cloned().unwrap_or_default();
            for aggregate in &bound {
                row.insert(aggregate.label.clone(), aggregate.compute(&members));
            }
            row
        })
        .collect();

    tracing::debug!(
        "Grouped by [{}]: {} groups, {} aggregates",
        group_by.join(", "),
        grouped.len(),
        bound.len()
    );
    Ok((grouped, grouped_schema))
}

fn group_key(row: &Row, keys: &[String]) -> Vec<String> {
    keys.iter()
        .map(|key| {
            row.get(key)
                .map(String::as_str)
                .filter(|v| !is_null(v))
                .unwrap_or(NULL)
                .to_string()
        })
        .collect()
}
