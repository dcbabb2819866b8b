//! Core data types for the health metric store
//!
//! This module defines the shapes shared by the store and the query engine:
//! - `Value`: a dynamically typed cell (number, text, instant, or null)
//! - `Record`: one timestamped row with a sparse set of metrics
//! - `SourceFile`: one parsed, date-named CSV export
//! - `DateRange`: a closed interval of instants for range reads

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::storage::zone::Zone;

/// Name of the pseudo-column that exposes a record's timestamp
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// A single cell value
///
/// Metrics loaded from CSV are only ever `Null`, `Number` or `Text`.
/// `Time` appears for the `timestamp` pseudo-column and for query
/// literals that look like dates.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Missing or empty cell
    #[default]
    Null,
    /// Numeric cell
    Number(f64),
    /// Any non-numeric cell
    Text(String),
    /// An absolute instant
    Time(DateTime<Utc>),
}

impl Value {
    /// Type a raw CSV cell opportunistically
    ///
    /// Empty cells become `Null`, numeric strings become `Number`,
    /// anything else is kept as `Text`.
    pub fn from_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match parse_number(trimmed) {
            Some(n) => Value::Number(n),
            None => Value::Text(trimmed.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Strict numeric view: only finite `Number` cells qualify
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    /// Numeric coercion used by ordering comparisons
    ///
    /// Text that does not parse as a number, and `Null`, coerce to NaN so
    /// every comparison against them is false.
    pub fn coerce_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Text(s) => parse_number(s.trim()).unwrap_or(f64::NAN),
            Value::Time(t) => t.timestamp_millis() as f64,
            Value::Null => f64::NAN,
        }
    }

    /// Plain text rendering, used by LIKE and mixed-type ordering
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Time(t) => t.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Number(n) => match whole_number(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
            Value::Text(s) => serializer.serialize_str(s),
            Value::Time(t) => {
                serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t)
    }
}

/// Parse a numeric-looking string, rejecting `NaN`/`inf` spellings
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    let looks_numeric = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
    if !looks_numeric || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Integral reading of a finite number small enough to round-trip through `i64`
fn whole_number(n: f64) -> Option<i64> {
    (n.fract() == 0.0 && n.abs() < 1e15).then_some(n as i64)
}

/// Render a number without a trailing `.0` for integral values
pub(crate) fn format_number(n: f64) -> String {
    match whole_number(n) {
        Some(i) => i.to_string(),
        None => n.to_string(),
    }
}

/// One timestamped observation with a sparse set of metric values
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Absolute instant of the observation
    pub timestamp: DateTime<Utc>,
    /// Metric name to value; names may contain spaces and brackets
    pub values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Builder method: set a metric value
    pub fn with(mut self, metric: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(metric.into(), value.into());
        self
    }

    /// Read a column; `timestamp` yields the record's instant and
    /// missing metrics read as `Null`
    pub fn get(&self, column: &str) -> Value {
        if column == TIMESTAMP_COLUMN {
            return Value::Time(self.timestamp);
        }
        self.values.get(column).cloned().unwrap_or_default()
    }

    /// Local hour-of-day of this record in the given zone
    pub fn local_hour(&self, zone: &Zone) -> u32 {
        zone.hour(self.timestamp)
    }
}

/// One parsed CSV export
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path the file was read from (also the cache key)
    pub path: PathBuf,
    /// Calendar date encoded in the filename
    pub date: NaiveDate,
    /// Parsed records in file order
    pub records: Vec<Record>,
    /// Distinct metric columns declared by the header
    pub metrics: Vec<String>,
    /// Number of records parsed
    pub record_count: usize,
}

impl SourceFile {
    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|r| r.timestamp).min()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|r| r.timestamp).max()
    }
}

/// Closed time interval `[start, end]`
///
/// `start <= end` is assumed by callers and not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The whole wall-clock day `date` in `zone`, end inclusive to the millisecond
    pub fn day(date: NaiveDate, zone: &Zone) -> Option<Self> {
        let (start, end) = zone.day_bounds(date)?;
        Some(Self { start, end })
    }

    /// Range covering the last N days up to now
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - chrono::Duration::days(days),
            end,
        }
    }

    /// Check if an instant lies within the range (both ends inclusive)
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Check if two closed ranges share at least one instant
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }
}

/// Cache introspection snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub enabled: bool,
    /// Cached file paths in insertion order
    pub files: Vec<PathBuf>,
}

/// One non-null observation of a metric
#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: Value,
}

/// Overall span of the available data
#[derive(Debug, Clone, Serialize)]
pub struct DateSummary {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub file_count: usize,
}

impl DateSummary {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.start, self.end)
    }
}
