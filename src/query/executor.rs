//! Query Executor
//!
//! Evaluates a `ParsedQuery` over a record sequence fetched from a
//! `RecordSource`, performing:
//! 1. Filtering by WHERE conditions (all must hold)
//! 2. Bucketing and aggregation for GROUP BY / aggregate SELECT items
//! 3. Multi-key sorting with nulls first
//! 4. LIMIT/OFFSET slicing
//! 5. Rendering as json, csv or summary
//!
//! # Execution Pipeline
//!
//! ```text
//! Query → Parse → Fetch → Filter → Group/Aggregate → Sort → Paginate → Format → Result
//! ```

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::query::ast::*;
use crate::query::error::{QueryError, QueryOutcome};
use crate::query::format::{self, OutputFormat};
use crate::query::parser::parse_query_in;
use crate::storage::{DateRange, Record, RecordSource, Value, Zone, TIMESTAMP_COLUMN};

/// Caller-supplied execution options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default)]
    pub format: OutputFormat,
}

impl QueryOptions {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

/// Result of a query execution
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Output column names, in order
    pub columns: Vec<String>,
    /// One array of cells per row, aligned with `columns`
    pub rows: Vec<Vec<JsonValue>>,
    pub row_count: usize,
    /// Wall time spent fetching and evaluating
    #[serde(rename = "execution_time_ms", serialize_with = "serialize_millis")]
    pub execution_time: Duration,
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl QueryResult {
    /// A result with no columns and no rows
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            execution_time: Duration::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&JsonValue>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().filter_map(|row| row.get(index)).collect())
    }

    /// Render as CSV text with a header line
    pub fn to_csv_string(&self) -> QueryOutcome<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        if !self.columns.is_empty() {
            writer
                .write_record(&self.columns)
                .map_err(|e| QueryError::execution("failed to write CSV header", e))?;
        }
        for row in &self.rows {
            writer
                .write_record(row.iter().map(cell_text))
                .map_err(|e| QueryError::execution("failed to write CSV row", e))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| QueryError::execution("failed to flush CSV output", e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| QueryError::execution("CSV output is not UTF-8", e))
    }
}

fn cell_text(cell: &JsonValue) -> String {
    match cell {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Run a parsed query over an in-memory record sequence
///
/// Pure and synchronous: no I/O, no shared state.
pub fn execute_records(
    query: &ParsedQuery,
    records: &[Record],
    options: &QueryOptions,
    zone: &Zone,
) -> QueryResult {
    let started = Instant::now();

    let filtered: Vec<&Record> = records
        .iter()
        .filter(|record| query.filters.iter().all(|f| f.evaluate(*record)))
        .collect();

    let rows = if query.is_aggregating() {
        group_rows(query, &filtered, zone)
    } else {
        filtered.iter().map(|r| Row::from_record(r)).collect()
    };

    let order_by = resolve_aliases(&query.order_by, &query.select);
    let rows = sort_rows(rows, &order_by, zone);
    let rows = paginate(rows, query.limit, query.offset);
    let (columns, rows) = format::render(&query.select, &rows, options.format, zone);

    QueryResult {
        row_count: rows.len(),
        columns,
        rows,
        execution_time: started.elapsed(),
    }
}

/// Bucket records by the GROUP BY key and evaluate SELECT once per bucket
///
/// Buckets come out in first-seen order. Without GROUP BY the whole
/// sequence is a single bucket.
fn group_rows(query: &ParsedQuery, records: &[&Record], zone: &Zone) -> Vec<Row> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<Vec<&Record>> = Vec::new();

    for &record in records {
        let key = query
            .group_by
            .iter()
            .map(|expr| expr.evaluate(record, zone).to_text())
            .collect::<Vec<_>>()
            .join("\u{1f}");

        let slot = *index.entry(key).or_insert_with(|| {
            buckets.push(Vec::new());
            buckets.len() - 1
        });
        buckets[slot].push(record);
    }

    debug!("Grouped {} records into {} buckets", records.len(), buckets.len());
    buckets
        .iter()
        .filter_map(|bucket| bucket_row(query, bucket, zone))
        .collect()
}

fn bucket_row(query: &ParsedQuery, bucket: &[&Record], zone: &Zone) -> Option<Row> {
    let first = *bucket.first()?;
    let mut row = Row::default();

    for item in &query.select {
        let value = match &item.expr {
            ColumnExpr::Star => {
                for (name, value) in Row::from_record(first).values {
                    row.values.entry(name).or_insert(value);
                }
                continue;
            }
            ColumnExpr::Aggregate(AggregateFunc::Count, column) if column == "*" => {
                Value::Number(bucket.len() as f64)
            }
            ColumnExpr::Aggregate(func, column) => {
                let values: Vec<Value> = bucket.iter().map(|r| r.get(column)).collect();
                Value::Number(func.apply(&values))
            }
            expr if query.group_by.contains(expr) => expr.evaluate(first, zone),
            _ => Value::Null,
        };

        if item.alias.is_some() {
            row.sort_keys.insert(item.expr.output_name(), value.clone());
        }
        row.insert(item.display_name(), value);
    }

    // Group expressions stay sortable even when not selected
    for expr in &query.group_by {
        let name = expr.output_name();
        if !row.values.contains_key(&name) && !row.sort_keys.contains_key(&name) {
            row.sort_keys.insert(name, expr.evaluate(first, zone));
        }
    }

    Some(row)
}

/// Rewrite ORDER BY names that refer to a SELECT alias into the aliased expression
///
/// An alias shadows a stored column of the same name.
fn resolve_aliases(order_by: &[OrderBy], select: &[SelectItem]) -> Vec<OrderBy> {
    order_by
        .iter()
        .map(|order| {
            let ColumnExpr::Field(name) = &order.expr else {
                return order.clone();
            };
            match select.iter().find(|item| item.alias.as_deref() == Some(name.as_str())) {
                Some(item) => OrderBy {
                    expr: item.expr.clone(),
                    direction: order.direction,
                },
                None => order.clone(),
            }
        })
        .collect()
}

/// Stable multi-key sort; nulls first regardless of direction
fn sort_rows(rows: Vec<Row>, order_by: &[OrderBy], zone: &Zone) -> Vec<Row> {
    if order_by.is_empty() {
        return rows;
    }

    let mut keyed: Vec<(Vec<Value>, Row)> = rows
        .into_iter()
        .map(|row| {
            let keys = order_by.iter().map(|o| row.resolve(&o.expr, zone)).collect();
            (keys, row)
        })
        .collect();

    keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, order_by));
    keyed.into_iter().map(|(_, row)| row).collect()
}

fn compare_keys(a: &[Value], b: &[Value], order_by: &[OrderBy]) -> Ordering {
    for ((x, y), order) in a.iter().zip(b).zip(order_by) {
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => match order.direction {
                SortDirection::Asc => compare_values(x, y),
                SortDirection::Desc => compare_values(x, y).reverse(),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Order two non-null values
///
/// Values with a numeric reading (numbers, numeric text, instants) come
/// first and compare numerically; the rest compare as text.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (x, y) = (a.coerce_number(), b.coerce_number());
    match (x.is_nan(), y.is_nan()) {
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (true, true) => a.to_text().cmp(&b.to_text()),
    }
}

fn paginate(rows: Vec<Row>, limit: Option<usize>, offset: Option<usize>) -> Vec<Row> {
    let rows = rows.into_iter().skip(offset.unwrap_or(0));
    match limit {
        Some(n) => rows.take(n).collect(),
        None => rows.collect(),
    }
}

impl Row {
    /// Value of an ORDER BY expression for this row
    fn resolve(&self, expr: &ColumnExpr, zone: &Zone) -> Value {
        let name = expr.output_name();
        if let Some(value) = self.values.get(&name).or_else(|| self.sort_keys.get(&name)) {
            return value.clone();
        }
        expr.evaluate(self, zone)
    }
}

/// Query executor over a record source
pub struct QueryExecutor {
    source: Arc<dyn RecordSource>,
}

impl QueryExecutor {
    /// Create a new query executor
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self { source }
    }

    /// Parse and execute a query string
    ///
    /// Without a `range`, the full span of available data is queried.
    pub async fn execute_str(
        &self,
        query: &str,
        range: Option<DateRange>,
        options: QueryOptions,
    ) -> QueryOutcome<QueryResult> {
        let query_id = Uuid::new_v4();
        let span = tracing::info_span!("query", %query_id);

        async {
            debug!(query, "Parsing query");
            let parsed = parse_query_in(query, &self.source.zone())?;
            self.execute(parsed, range, options).await
        }
        .instrument(span)
        .await
    }

    /// Execute a parsed query
    pub async fn execute(
        &self,
        query: ParsedQuery,
        range: Option<DateRange>,
        options: QueryOptions,
    ) -> QueryOutcome<QueryResult> {
        let started = Instant::now();

        let range = match range {
            Some(range) => Some(range),
            None => self.source.full_range().await?,
        };
        let Some(range) = range else {
            debug!("No data available, returning empty result");
            return Ok(QueryResult::empty());
        };

        let records = self.source.records_in_range(&range).await?;
        let fetched = records.len();
        let zone = self.source.zone();

        let mut result = tokio::task::spawn_blocking(move || {
            execute_records(&query, &records, &options, &zone)
        })
        .await
        .map_err(|e| QueryError::execution("query evaluation task failed", e))?;
        result.execution_time = started.elapsed();

        info!(
            records = fetched,
            rows = result.row_count,
            elapsed_ms = result.execution_time.as_millis() as u64,
            "Query executed"
        );
        Ok(result)
    }
}

/// Convenience methods for common queries
impl QueryExecutor {
    /// Non-null readings of one metric over the last N days
    pub async fn query_last_days(&self, metric: &str, days: i64) -> QueryOutcome<QueryResult> {
        let query = ParsedQuery::select(vec![
            SelectItem::new(ColumnExpr::Field(TIMESTAMP_COLUMN.to_string())),
            SelectItem::new(ColumnExpr::Field(metric.to_string())),
        ])
        .filter(QueryFilter::new(metric, FilterOp::IsNotNull, FilterValue::None))
        .build();
        self.execute(query, Some(DateRange::last_days(days)), QueryOptions::default())
            .await
    }

    /// Per-day avg/min/max/count of one metric
    pub async fn query_daily_summary(
        &self,
        metric: &str,
        range: Option<DateRange>,
    ) -> QueryOutcome<QueryResult> {
        let aggregate = |func: AggregateFunc, alias: &str| {
            SelectItem::new(ColumnExpr::Aggregate(func, metric.to_string())).with_alias(alias)
        };

        let query = ParsedQuery::select(vec![
            SelectItem::new(ColumnExpr::Bucket(TimeBucket::Date)).with_alias("date"),
            aggregate(AggregateFunc::Avg, "avg"),
            aggregate(AggregateFunc::Min, "min"),
            aggregate(AggregateFunc::Max, "max"),
            aggregate(AggregateFunc::Count, "count"),
        ])
        .filter(QueryFilter::new(metric, FilterOp::IsNotNull, FilterValue::None))
        .group_by(ColumnExpr::Bucket(TimeBucket::Date))
        .order_by(OrderBy::asc(ColumnExpr::Bucket(TimeBucket::Date)))
        .build();
        self.execute(query, range, QueryOptions::default()).await
    }
}
