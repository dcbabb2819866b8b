//! Result formatting
//!
//! Turns evaluated rows into the column list and cell grid of a
//! `QueryResult`. Three shapes are supported:
//!
//! - **json**: typed cells, instants as RFC 3339 with milliseconds
//! - **csv**: every cell as text, instants as `YYYY-MM-DD HH:MM:SS`
//! - **summary**: one row of count/sum/avg/min/max per numeric column

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::query::ast::{ColumnExpr, ColumnLookup, Row, SelectItem};
use crate::query::error::QueryError;
use crate::storage::types::format_number;
use crate::storage::{Value, Zone, TIMESTAMP_COLUMN};

/// Wall-clock rendering of instants in CSV output
const CSV_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output shape of a query result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Summary,
}

impl FromStr for OutputFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "summary" => Ok(Self::Summary),
            other => Err(QueryError::UnknownFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

/// A result column and where its cells come from
#[derive(Debug, Clone, PartialEq)]
enum OutputColumn {
    /// A column copied as-is, from `*` expansion
    Stored(String),
    /// A SELECT item
    Item(SelectItem),
}

impl OutputColumn {
    fn name(&self) -> String {
        match self {
            Self::Stored(name) => name.clone(),
            Self::Item(item) => item.display_name(),
        }
    }

    /// Value under the output name, else the expression over the row
    fn cell(&self, row: &Row, zone: &Zone) -> Value {
        match self {
            Self::Stored(name) => row.column(name),
            Self::Item(item) => match row.get(&item.display_name()) {
                Some(value) => value.clone(),
                None => item.expr.evaluate(row, zone),
            },
        }
    }
}

/// Resolve the SELECT list against the rows, expanding `*`
fn output_columns(select: &[SelectItem], rows: &[Row]) -> Vec<OutputColumn> {
    let mut columns: Vec<OutputColumn> = Vec::new();
    let mut seen = BTreeSet::new();

    for item in select {
        let expanded = match item.expr {
            ColumnExpr::Star => {
                let mut names: BTreeSet<&str> = BTreeSet::new();
                for row in rows {
                    names.extend(row.values.keys().map(String::as_str));
                }
                names.remove(TIMESTAMP_COLUMN);

                std::iter::once(TIMESTAMP_COLUMN)
                    .chain(names)
                    .map(|n| OutputColumn::Stored(n.to_string()))
                    .collect()
            }
            _ => vec![OutputColumn::Item(item.clone())],
        };

        for column in expanded {
            if seen.insert(column.name()) {
                columns.push(column);
            }
        }
    }
    columns
}

/// Render rows in the requested shape
///
/// No rows yields no columns and no rows.
pub fn render(
    select: &[SelectItem],
    rows: &[Row],
    format: OutputFormat,
    zone: &Zone,
) -> (Vec<String>, Vec<Vec<JsonValue>>) {
    if rows.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let columns = output_columns(select, rows);
    match format {
        OutputFormat::Json => grid(&columns, rows, |v| json_cell(&v), zone),
        OutputFormat::Csv => grid(&columns, rows, |v| JsonValue::String(csv_cell(&v, zone)), zone),
        OutputFormat::Summary => summarize(&columns, rows, zone),
    }
}

fn grid(
    columns: &[OutputColumn],
    rows: &[Row],
    cell: impl Fn(Value) -> JsonValue,
    zone: &Zone,
) -> (Vec<String>, Vec<Vec<JsonValue>>) {
    let names = columns.iter().map(OutputColumn::name).collect();
    let grid = rows
        .iter()
        .map(|row| columns.iter().map(|c| cell(c.cell(row, zone))).collect())
        .collect();
    (names, grid)
}

/// Typed JSON cell; instants as RFC 3339 with millisecond precision
pub fn json_cell(value: &Value) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

/// Text cell; nulls are empty and instants are wall-clock in `zone`
pub fn csv_cell(value: &Value, zone: &Zone) -> String {
    match value {
        Value::Null => String::new(),
        Value::Number(n) => format_number(*n),
        Value::Text(s) => s.clone(),
        Value::Time(t) => zone.naive_local(*t).format(CSV_TIME_FORMAT).to_string(),
    }
}

/// One row of statistics objects, one per non-timestamp column with numbers
fn summarize(
    columns: &[OutputColumn],
    rows: &[Row],
    zone: &Zone,
) -> (Vec<String>, Vec<Vec<JsonValue>>) {
    let mut names = Vec::new();
    let mut stats = Vec::new();

    for column in columns {
        let name = column.name();
        if name == TIMESTAMP_COLUMN {
            continue;
        }

        let numbers: Vec<f64> = rows
            .iter()
            .filter_map(|row| column.cell(row, zone).as_f64())
            .collect();
        if numbers.is_empty() {
            continue;
        }

        let sum: f64 = numbers.iter().sum();
        stats.push(json!({
            "count": numbers.len(),
            "sum": Value::Number(sum),
            "avg": Value::Number(sum / numbers.len() as f64),
            "min": Value::Number(numbers.iter().cloned().fold(f64::INFINITY, f64::min)),
            "max": Value::Number(numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
        }));
        names.push(name);
    }

    if names.is_empty() {
        return (Vec::new(), Vec::new());
    }
    (names, vec![stats])
}
