//! CSV export parsing
//!
//! Reads one per-day export into a `SourceFile`. Header names are trimmed,
//! one of the recognised timestamp columns becomes the record timestamp,
//! every other column becomes a sparse metric.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::io::Read;
use std::path::Path;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Record, SourceFile, Value};
use crate::storage::zone::Zone;

/// Header names that carry the row timestamp, in priority order
pub const TIMESTAMP_HEADERS: [&str; 2] = ["Date/Time", "Date"];

/// Wall-clock patterns tried after ISO-8601
const FALLBACK_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

/// Maximum warnings retained per file
const MAX_WARNINGS: usize = 100;

/// Parse a timestamp cell into an absolute instant
///
/// ISO-8601 is tried first (with and without offset), then the regional
/// wall-clock patterns, then a bare date at midnight. Wall-clock values
/// are pinned to `zone`.
pub fn parse_timestamp(raw: &str, zone: &Zone) -> StorageResult<DateTime<Utc>> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            FALLBACK_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });

    naive
        .and_then(|n| zone.resolve(n))
        .ok_or_else(|| StorageError::InvalidTimestamp(s.to_string()))
}

/// Outcome of parsing one export
#[derive(Debug)]
pub struct ParsedFile {
    pub file: SourceFile,
    /// Structural problems that dropped individual rows
    pub warnings: Vec<String>,
}

/// Parser for per-day CSV exports
#[derive(Debug, Clone, Default)]
pub struct CsvFileParser {
    zone: Zone,
}

impl CsvFileParser {
    pub fn new(zone: Zone) -> Self {
        Self { zone }
    }

    /// Parse an export from disk; `date` comes from the filename
    pub fn parse_file(&self, path: &Path, date: NaiveDate) -> StorageResult<ParsedFile> {
        let handle = std::fs::File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::FileNotFound(path.to_path_buf()),
            _ => StorageError::Io(e),
        })?;

        self.parse_reader(handle, path, date)
    }

    /// Parse an export from any reader (used for in-memory fixtures)
    pub fn parse_reader<R: Read>(
        &self,
        reader: R,
        path: &Path,
        date: NaiveDate,
    ) -> StorageResult<ParsedFile> {
        let csv_error = |e: csv::Error| StorageError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let timestamp_idx = TIMESTAMP_HEADERS
            .iter()
            .find_map(|name| headers.iter().position(|h| h == name))
            .ok_or_else(|| StorageError::CsvParse {
                path: path.to_path_buf(),
                message: format!(
                    "no timestamp column (expected one of {:?})",
                    TIMESTAMP_HEADERS
                ),
            })?;

        let mut metric_columns: Vec<(usize, String)> = Vec::new();
        for (idx, name) in headers.iter().enumerate() {
            if idx == timestamp_idx || name.is_empty() || TIMESTAMP_HEADERS.contains(&name.as_str())
            {
                continue;
            }
            if !metric_columns.iter().any(|(_, existing)| existing == name) {
                metric_columns.push((idx, name.clone()));
            }
        }

        let mut records = Vec::new();
        let mut warnings = Vec::new();

        for (line_num, result) in reader.records().enumerate() {
            let line = line_num + 2;

            let row = match result {
                Ok(r) => r,
                Err(e) => {
                    warnings.push(format!("Line {}: {}", line, e));
                    continue;
                }
            };

            // Rows with a different shape than the header are dropped silently
            if row.len() != headers.len() {
                continue;
            }

            let timestamp = match row
                .get(timestamp_idx)
                .map(|cell| parse_timestamp(cell, &self.zone))
            {
                Some(Ok(ts)) => ts,
                Some(Err(e)) => {
                    warnings.push(format!("Line {}: {}", line, e));
                    continue;
                }
                None => continue,
            };

            let mut record = Record::new(timestamp);
            for (idx, name) in &metric_columns {
                let value = row.get(*idx).map(Value::from_cell).unwrap_or_default();
                record.values.insert(name.clone(), value);
            }
            records.push(record);
        }

        if warnings.len() > MAX_WARNINGS {
            let total = warnings.len();
            warnings.truncate(MAX_WARNINGS);
            warnings.push(format!("... and {} more warnings", total - MAX_WARNINGS));
        }

        let record_count = records.len();
        Ok(ParsedFile {
            file: SourceFile {
                path: path.to_path_buf(),
                date,
                records,
                metrics: metric_columns.into_iter().map(|(_, name)| name).collect(),
                record_count,
            },
            warnings,
        })
    }
}
