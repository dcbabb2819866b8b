//! Query Abstract Syntax Tree
//!
//! Defines the parsed form of the SQL subset accepted by the engine.
//!
//! # Example Queries
//!
//! ```text
//! SELECT * FROM health_data WHERE `Step Count (steps)` > 1000
//! SELECT DATE(timestamp), SUM(`Step Count (steps)`) FROM health_data GROUP BY DATE(timestamp)
//! SELECT `Heart Rate [Avg] (bpm)` FROM health_data ORDER BY `Heart Rate [Avg] (bpm)` DESC LIMIT 5
//! ```

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::storage::{Record, Value, Zone, TIMESTAMP_COLUMN};

/// Default logical source name
pub const DEFAULT_SOURCE: &str = "health_data";

/// Read access to named columns
pub trait ColumnLookup {
    /// Value of a column; missing columns read as `Null`
    fn column(&self, name: &str) -> Value;
}

impl ColumnLookup for Record {
    fn column(&self, name: &str) -> Value {
        self.get(name)
    }
}

/// An intermediate result row keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub values: BTreeMap<String, Value>,
    /// Unselected or aliased expression values of an aggregated row,
    /// readable by ORDER BY only
    pub(crate) sort_keys: BTreeMap<String, Value>,
}

impl Row {
    /// Flatten a record, including its `timestamp` column
    pub fn from_record(record: &Record) -> Self {
        let mut values = record.values.clone();
        values.insert(TIMESTAMP_COLUMN.to_string(), Value::Time(record.timestamp));
        Self {
            values,
            sort_keys: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }
}

impl ColumnLookup for Row {
    fn column(&self, name: &str) -> Value {
        self.values.get(name).cloned().unwrap_or_default()
    }
}

/// Aggregation functions available in SELECT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunc {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateFunc {
    /// Reduce a bucket's values to one number
    ///
    /// COUNT counts non-null values of any type. The others work over the
    /// finite numeric values only and yield 0 when there are none.
    pub fn apply(&self, values: &[Value]) -> f64 {
        if let Self::Count = self {
            return values.iter().filter(|v| !v.is_null()).count() as f64;
        }

        let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
        if numbers.is_empty() {
            return 0.0;
        }

        match self {
            Self::Sum => numbers.iter().sum(),
            Self::Avg => numbers.iter().sum::<f64>() / numbers.len() as f64,
            Self::Min => numbers.iter().cloned().fold(f64::INFINITY, f64::min),
            Self::Max => numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            Self::Count => numbers.len() as f64,
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sum" => Some(Self::Sum),
            "avg" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "count" => Some(Self::Count),
            _ => None,
        }
    }
}

impl std::fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sum => write!(f, "SUM"),
            Self::Avg => write!(f, "AVG"),
            Self::Min => write!(f, "MIN"),
            Self::Max => write!(f, "MAX"),
            Self::Count => write!(f, "COUNT"),
        }
    }
}

/// Virtual time buckets computed from the timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    /// `YYYY-MM-DD`
    Date,
    /// `YYYY-MM-DD HH:00:00`
    Hour,
    /// Monday starting the ISO week, `YYYY-MM-DD`
    Week,
    /// First of the month, `YYYY-MM-01`
    Month,
}

impl TimeBucket {
    /// Canonical label of the bucket containing `ts`, in wall-clock time
    pub fn label(&self, ts: DateTime<Utc>, zone: &Zone) -> String {
        let local = zone.naive_local(ts);
        let date = local.date();

        match self {
            Self::Date => date.format("%Y-%m-%d").to_string(),
            Self::Hour => local.format("%Y-%m-%d %H:00:00").to_string(),
            Self::Week => {
                let days_since_monday = date.weekday().num_days_from_monday() as i64;
                (date - Duration::days(days_since_monday))
                    .format("%Y-%m-%d")
                    .to_string()
            }
            Self::Month => format!("{:04}-{:02}-01", date.year(), date.month()),
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "date" => Some(Self::Date),
            "hour" => Some(Self::Hour),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Date => write!(f, "DATE"),
            Self::Hour => write!(f, "HOUR"),
            Self::Week => write!(f, "WEEK"),
            Self::Month => write!(f, "MONTH"),
        }
    }
}

/// A column expression in SELECT, GROUP BY or ORDER BY
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnExpr {
    /// `*`
    Star,
    /// A stored column (or `timestamp`)
    Field(String),
    /// `DATE(timestamp)` and friends
    Bucket(TimeBucket),
    /// `SUM(col)` and friends; `COUNT(*)` carries `*`
    Aggregate(AggregateFunc, String),
}

impl ColumnExpr {
    /// Name of the output column this expression produces
    pub fn output_name(&self) -> String {
        match self {
            Self::Star => "*".to_string(),
            Self::Field(name) => name.clone(),
            Self::Bucket(bucket) => format!("{}({})", bucket, TIMESTAMP_COLUMN),
            Self::Aggregate(func, column) => format!("{}({})", func, column),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate(..))
    }

    /// Evaluate against a single row
    ///
    /// Aggregates and `*` have no per-row value and read as `Null`.
    pub fn evaluate(&self, row: &impl ColumnLookup, zone: &Zone) -> Value {
        match self {
            Self::Field(name) => row.column(name),
            Self::Bucket(bucket) => match row.column(TIMESTAMP_COLUMN) {
                Value::Time(ts) => Value::Text(bucket.label(ts, zone)),
                _ => Value::Null,
            },
            Self::Star | Self::Aggregate(..) => Value::Null,
        }
    }
}

/// An item in the SELECT clause
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: ColumnExpr,
    /// Optional alias for the result column
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: ColumnExpr) -> Self {
        Self { expr, alias: None }
    }

    /// Add an alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Get the display name (alias or expression name)
    pub fn display_name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.expr.output_name())
    }
}

/// Comparison operators in WHERE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
    In,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    /// Parse a symbolic operator
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "=" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Gte),
            "<=" => Some(Self::Lte),
            _ => None,
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::Ne => write!(f, "!="),
            Self::Gt => write!(f, ">"),
            Self::Lt => write!(f, "<"),
            Self::Gte => write!(f, ">="),
            Self::Lte => write!(f, "<="),
            Self::Like => write!(f, "LIKE"),
            Self::In => write!(f, "IN"),
            Self::IsNull => write!(f, "IS NULL"),
            Self::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Right-hand side of a filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// `IS NULL` / `IS NOT NULL`
    None,
    /// A single coerced literal
    Scalar(Value),
    /// The items of an `IN (...)` list
    List(Vec<Value>),
}

/// A single WHERE condition
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    pub column: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl QueryFilter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    /// Check whether a row satisfies this condition
    ///
    /// Pure: depends only on the row's value for `column` and the literal.
    pub fn evaluate(&self, row: &impl ColumnLookup) -> bool {
        let cell = row.column(&self.column);

        match (self.op, &self.value) {
            (FilterOp::IsNull, _) => cell.is_null(),
            (FilterOp::IsNotNull, _) => !cell.is_null(),
            (FilterOp::Eq, FilterValue::Scalar(v)) => strict_eq(&cell, v),
            (FilterOp::Ne, FilterValue::Scalar(v)) => !strict_eq(&cell, v),
            (FilterOp::Gt, FilterValue::Scalar(v)) => cell.coerce_number() > v.coerce_number(),
            (FilterOp::Lt, FilterValue::Scalar(v)) => cell.coerce_number() < v.coerce_number(),
            (FilterOp::Gte, FilterValue::Scalar(v)) => cell.coerce_number() >= v.coerce_number(),
            (FilterOp::Lte, FilterValue::Scalar(v)) => cell.coerce_number() <= v.coerce_number(),
            (FilterOp::Like, FilterValue::Scalar(pattern)) => {
                if cell.is_null() {
                    return false;
                }
                let needle = pattern.to_text().replace('%', "").to_lowercase();
                cell.to_text().to_lowercase().contains(&needle)
            }
            (FilterOp::In, FilterValue::List(items)) => items.iter().any(|v| strict_eq(&cell, v)),
            _ => false,
        }
    }
}

/// Strict equality: same type and same value
fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::Time(x), Value::Time(y)) => x == y,
        _ => false,
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: ColumnExpr,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(expr: ColumnExpr) -> Self {
        Self {
            expr,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(expr: ColumnExpr) -> Self {
        Self {
            expr,
            direction: SortDirection::Desc,
        }
    }
}

/// A parsed query ready for execution
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    /// Columns to produce
    pub select: Vec<SelectItem>,
    /// Source name from FROM
    pub from: String,
    /// Conditions, all of which must hold
    pub filters: Vec<QueryFilter>,
    /// Bucketing expressions
    pub group_by: Vec<ColumnExpr>,
    /// Sort keys, most significant first
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ParsedQuery {
    /// Start building a query with a SELECT list
    pub fn select(items: Vec<SelectItem>) -> QueryBuilder {
        QueryBuilder::new(items)
    }

    /// Whether evaluation collapses records into buckets
    pub fn is_aggregating(&self) -> bool {
        !self.group_by.is_empty() || self.select.iter().any(|s| s.expr.is_aggregate())
    }
}

/// Builder for constructing queries programmatically
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: ParsedQuery,
}

impl QueryBuilder {
    pub fn new(select: Vec<SelectItem>) -> Self {
        Self {
            query: ParsedQuery {
                select,
                from: DEFAULT_SOURCE.to_string(),
                filters: Vec::new(),
                group_by: Vec::new(),
                order_by: Vec::new(),
                limit: None,
                offset: None,
            },
        }
    }

    /// Add a filter
    pub fn filter(mut self, filter: QueryFilter) -> Self {
        self.query.filters.push(filter);
        self
    }

    /// Add a GROUP BY expression
    pub fn group_by(mut self, expr: ColumnExpr) -> Self {
        self.query.group_by.push(expr);
        self
    }

    /// Add an ORDER BY key
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.query.order_by.push(order);
        self
    }

    /// Set a limit on results
    pub fn limit(mut self, n: usize) -> Self {
        self.query.limit = Some(n);
        self.query.offset.get_or_insert(0);
        self
    }

    /// Skip the first `n` results
    pub fn offset(mut self, n: usize) -> Self {
        self.query.offset = Some(n);
        self
    }

    /// Build the query
    pub fn build(self) -> ParsedQuery {
        self.query
    }
}
