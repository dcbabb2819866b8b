//! Time-Series Store
//!
//! Orchestrates the read path over per-day CSV exports:
//! - Discovery: re-scan the data directory on every call
//! - Load: parse a file on a blocking thread, cache it by path
//! - Range read: skip non-overlapping days, filter, merge, dedup
//!
//! The store is shared behind `Arc`; the cache is the only mutable state.

use chrono::NaiveDate;
use futures_util::future::join_all;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::storage::cache::FileCache;
use crate::storage::csv_file::CsvFileParser;
use crate::storage::discovery::{discover_files, FileNaming};
use crate::storage::error::StorageResult;
use crate::storage::types::{
    CacheStats, DateRange, DateSummary, MetricSample, Record, SourceFile,
};
use crate::storage::zone::Zone;

/// Configuration for the store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory scanned for exports
    pub data_dir: PathBuf,
    /// Filename prefix of the export tool
    pub file_prefix: String,
    /// Filename extension (without dot)
    pub file_extension: String,
    /// Maximum number of cached files
    pub cache_size: usize,
    /// Whether parsed files are cached at all
    pub cache_enabled: bool,
    /// Zone for wall-clock timestamps
    pub zone: Zone,
    /// Local hour whose records are dropped from range reads
    ///
    /// Defaults to 1: the export tool mis-attributes entries around
    /// midnight to the wrong day and they surface in that hour. This also
    /// drops genuine readings taken between 01:00 and 01:59.
    pub excluded_hour: Option<u32>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            file_prefix: "HealthMetrics".to_string(),
            file_extension: "csv".to_string(),
            cache_size: 50,
            cache_enabled: true,
            zone: Zone::Local,
            excluded_hour: Some(1),
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Builder: set the zone
    pub fn zone(mut self, zone: Zone) -> Self {
        self.zone = zone;
        self
    }

    /// Builder: set cache capacity
    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// Builder: enable or disable caching
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Builder: set or clear the dropped local hour
    pub fn excluded_hour(mut self, hour: Option<u32>) -> Self {
        self.excluded_hour = hour;
        self
    }
}

/// The time-series store over CSV exports
#[derive(Debug)]
pub struct TimeSeriesStore {
    config: StoreConfig,
    naming: FileNaming,
    parser: CsvFileParser,
    cache: FileCache,
}

impl TimeSeriesStore {
    /// Create a store; no files are touched until the first read
    pub fn new(config: StoreConfig) -> StorageResult<Self> {
        let naming = FileNaming::new(&config.file_prefix, &config.file_extension)?;
        let parser = CsvFileParser::new(config.zone);
        let cache = FileCache::new(config.cache_size);

        Ok(Self {
            config,
            naming,
            parser,
            cache,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn zone(&self) -> Zone {
        self.config.zone
    }

    /// List export files, sorted and distinct
    pub fn discover_files(&self) -> StorageResult<Vec<PathBuf>> {
        discover_files(&self.config.data_dir, &self.naming)
    }

    /// Calendar date encoded in a file's name
    pub fn file_date(&self, path: &Path) -> StorageResult<NaiveDate> {
        self.naming.extract_date(path)
    }

    /// Load one file, from cache when possible
    ///
    /// Errors are returned to the caller as-is.
    pub async fn load_file(&self, path: &Path) -> StorageResult<Arc<SourceFile>> {
        if !self.config.cache_enabled {
            return self.parse_file(path).await.map(Arc::new);
        }

        self.cache
            .get_or_load(path, || self.parse_file(path))
            .await
    }

    /// Parse a file on a blocking thread
    async fn parse_file(&self, path: &Path) -> StorageResult<SourceFile> {
        let date = self.naming.extract_date(path)?;
        let parser = self.parser.clone();
        let owned = path.to_path_buf();

        let parsed = tokio::task::spawn_blocking(move || parser.parse_file(&owned, date)).await??;

        if !parsed.warnings.is_empty() {
            tracing::warn!(
                file = ?path,
                count = parsed.warnings.len(),
                "Dropped rows while parsing export"
            );
            for warning in &parsed.warnings {
                tracing::debug!(file = ?path, "{}", warning);
            }
        }

        tracing::info!(
            "Loaded {:?}: {} records, {} metrics",
            path,
            parsed.file.record_count,
            parsed.file.metrics.len()
        );
        Ok(parsed.file)
    }

    /// Discover and load every file, skipping the ones that fail
    pub async fn load_all_files(&self) -> StorageResult<Vec<Arc<SourceFile>>> {
        let paths = self.discover_files()?;
        Ok(self.load_many(&paths).await)
    }

    /// Load files concurrently; failures are logged and left out
    async fn load_many(&self, paths: &[PathBuf]) -> Vec<Arc<SourceFile>> {
        let results = join_all(paths.iter().map(|p| self.load_file(p))).await;

        paths
            .iter()
            .zip(results)
            .filter_map(|(path, result)| match result {
                Ok(file) => Some(file),
                Err(e) => {
                    tracing::warn!("Failed to load {:?}: {}", path, e);
                    None
                }
            })
            .collect()
    }

    /// All records with a timestamp in `range`, sorted and deduplicated
    ///
    /// Files whose day does not overlap the range are never parsed. When
    /// two records share a timestamp, the one from the later file wins.
    pub async fn get_data_in_range(&self, range: &DateRange) -> StorageResult<Vec<Record>> {
        let zone = self.config.zone;
        let mut overlapping = Vec::new();

        for path in self.discover_files()? {
            let date = match self.naming.extract_date(&path) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {}", path, e);
                    continue;
                }
            };
            match DateRange::day(date, &zone) {
                Some(day) if day.overlaps(range) => overlapping.push(path),
                _ => {}
            }
        }

        tracing::debug!(
            "Range {} .. {} overlaps {} file(s)",
            range.start,
            range.end,
            overlapping.len()
        );

        let files = self.load_many(&overlapping).await;

        let mut merged: Vec<Record> = files
            .iter()
            .flat_map(|file| file.records.iter())
            .filter(|r| range.contains(r.timestamp) && !self.is_excluded(r))
            .cloned()
            .collect();

        // Stable sort keeps file order among equal timestamps
        merged.sort_by_key(|r| r.timestamp);
        Ok(dedup_keep_last(merged))
    }

    fn is_excluded(&self, record: &Record) -> bool {
        self.config
            .excluded_hour
            .map(|hour| record.local_hour(&self.config.zone) == hour)
            .unwrap_or(false)
    }

    /// Every distinct metric name across all files, sorted
    pub async fn metric_names(&self) -> StorageResult<Vec<String>> {
        let files = self.load_all_files().await?;

        let names: BTreeSet<String> = files
            .iter()
            .flat_map(|f| f.metrics.iter().cloned())
            .collect();

        Ok(names.into_iter().collect())
    }

    /// Earliest and latest timestamp across all files
    ///
    /// Only the first and last files by date are parsed; if either cannot
    /// be loaded, its day boundary stands in.
    pub async fn date_summary(&self) -> StorageResult<Option<DateSummary>> {
        let mut dated: Vec<(NaiveDate, PathBuf)> = Vec::new();
        for path in self.discover_files()? {
            match self.naming.extract_date(&path) {
                Ok(date) => dated.push((date, path)),
                Err(e) => tracing::warn!("Skipping {:?}: {}", path, e),
            }
        }
        dated.sort();

        let (Some((first_date, first_path)), Some((last_date, last_path))) =
            (dated.first(), dated.last())
        else {
            return Ok(None);
        };

        let zone = self.config.zone;
        let first_day = DateRange::day(*first_date, &zone);
        let last_day = DateRange::day(*last_date, &zone);

        let start = match self.load_file(first_path).await {
            Ok(file) => file.first_timestamp(),
            Err(e) => {
                tracing::warn!("Failed to load {:?}: {}", first_path, e);
                None
            }
        }
        .or(first_day.map(|d| d.start));

        let end = match self.load_file(last_path).await {
            Ok(file) => file.last_timestamp(),
            Err(e) => {
                tracing::warn!("Failed to load {:?}: {}", last_path, e);
                None
            }
        }
        .or(last_day.map(|d| d.end));

        Ok(match (start, end) {
            (Some(start), Some(end)) => Some(DateSummary {
                start,
                end,
                file_count: dated.len(),
            }),
            _ => None,
        })
    }

    /// Up to `limit` non-null observations of `metric`
    ///
    /// Files are scanned in discovery order and scanning stops as soon as
    /// enough samples are collected.
    pub async fn sample_metric(&self, metric: &str, limit: usize) -> StorageResult<Vec<MetricSample>> {
        let mut samples = Vec::new();
        if limit == 0 {
            return Ok(samples);
        }

        for path in self.discover_files()? {
            let file = match self.load_file(&path).await {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!("Failed to load {:?}: {}", path, e);
                    continue;
                }
            };

            for record in &file.records {
                match record.values.get(metric) {
                    Some(value) if !value.is_null() => {
                        samples.push(MetricSample {
                            timestamp: record.timestamp,
                            value: value.clone(),
                        });
                        if samples.len() >= limit {
                            return Ok(samples);
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(samples)
    }

    /// Cache size and member keys
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats(self.config.cache_enabled).await
    }

    /// Drop every cached file
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        tracing::info!("File cache cleared");
    }
}

/// Collapse runs of equal timestamps, keeping the last record of each run
fn dedup_keep_last(records: Vec<Record>) -> Vec<Record> {
    let mut out: Vec<Record> = Vec::with_capacity(records.len());
    for record in records {
        match out.last_mut() {
            Some(prev) if prev.timestamp == record.timestamp => *prev = record,
            _ => out.push(record),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::Value;
    use crate::storage::StorageError;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::tempdir;

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, h, m, 0).unwrap()
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn create_test_store(dir: &Path) -> TimeSeriesStore {
        TimeSeriesStore::new(StoreConfig::new(dir).zone(Zone::utc()).cache_size(10)).unwrap()
    }

    #[tokio::test]
    async fn test_load_file_caches() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "HealthMetrics-2025-01-15.csv",
            "Date/Time,Steps\n2025-01-15 08:00:00,10\n",
        );
        let store = create_test_store(dir.path());

        let first = store.load_file(&path).await.unwrap();
        let second = store.load_file(&path).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        assert_eq!(store.cache_stats().await.files, vec![path]);
    }

    #[tokio::test]
    async fn test_load_file_cache_disabled() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "HealthMetrics-2025-01-15.csv",
            "Date/Time,Steps\n2025-01-15 08:00:00,10\n",
        );
        let store = TimeSeriesStore::new(
            StoreConfig::new(dir.path())
                .zone(Zone::utc())
                .cache_enabled(false),
        )
        .unwrap();

        store.load_file(&path).await.unwrap();

        let stats = store.cache_stats().await;
        assert_eq!(stats.size, 0);
        assert!(!stats.enabled);
    }

    #[tokio::test]
    async fn test_load_file_propagates_errors() {
        let dir = tempdir().unwrap();
        let bad_name = write(dir.path(), "HealthMetrics-2025-xx-15.csv", "Date/Time\n");
        let store = create_test_store(dir.path());

        let result = store.load_file(&bad_name).await;
        assert!(matches!(result, Err(StorageError::InvalidFilename(_))));

        let missing = dir.path().join("HealthMetrics-2025-02-01.csv");
        let result = store.load_file(&missing).await;
        assert!(matches!(result, Err(StorageError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_load_all_skips_failures() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "HealthMetrics-2025-01-15.csv",
            "Date/Time,Steps\n2025-01-15 08:00:00,10\n",
        );
        write(dir.path(), "HealthMetrics-2025-ab-16.csv", "Date/Time,Steps\n");
        write(dir.path(), "HealthMetrics20250117.csv", "NoTime,Steps\n1,2\n");
        let store = create_test_store(dir.path());

        let files = store.load_all_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].record_count, 1);
    }

    #[tokio::test]
    async fn test_range_dedup_later_file_wins() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "HealthMetrics-2025-01-15.csv",
            "Date/Time,Steps\n\
             2025-01-15 23:00:00,100\n\
             2025-01-15 10:00:00,50\n",
        );
        write(
            dir.path(),
            "HealthMetrics20250115.csv",
            "Date/Time,Steps\n2025-01-15 23:00:00,999\n",
        );
        let store = create_test_store(dir.path());

        let range = DateRange::new(at(15, 0, 0), at(15, 23, 59));
        let records = store.get_data_in_range(&range).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, at(15, 10, 0));
        assert_eq!(records[1].timestamp, at(15, 23, 0));
        assert_eq!(records[1].get("Steps"), Value::Number(999.0));
    }

    #[tokio::test]
    async fn test_range_excludes_hour_one_and_out_of_range() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "HealthMetrics-2025-01-15.csv",
            "Date/Time,Steps\n\
             2025-01-15 00:59:00,1\n\
             2025-01-15 01:00:00,2\n\
             2025-01-15 01:59:00,3\n\
             2025-01-15 02:00:00,4\n\
             2025-01-15 20:00:00,5\n",
        );
        let store = create_test_store(dir.path());

        let range = DateRange::new(at(15, 0, 0), at(15, 12, 0));
        let records = store.get_data_in_range(&range).await.unwrap();

        let steps: Vec<Value> = records.iter().map(|r| r.get("Steps")).collect();
        assert_eq!(steps, vec![Value::Number(1.0), Value::Number(4.0)]);
    }

    #[tokio::test]
    async fn test_range_skips_non_overlapping_files() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "HealthMetrics-2025-01-15.csv",
            "Date/Time,Steps\n2025-01-15 08:00:00,10\n",
        );
        write(
            dir.path(),
            "HealthMetrics-2025-01-20.csv",
            "Date/Time,Steps\n2025-01-20 08:00:00,20\n",
        );
        let store = create_test_store(dir.path());

        let range = DateRange::new(at(20, 0, 0), at(20, 23, 0));
        let records = store.get_data_in_range(&range).await.unwrap();

        assert_eq!(records.len(), 1);
        let cached = store.cache_stats().await.files;
        assert_eq!(cached.len(), 1);
        assert!(cached[0].ends_with("HealthMetrics-2025-01-20.csv"));
    }

    #[tokio::test]
    async fn test_range_without_files_is_empty() {
        let dir = tempdir().unwrap();
        let store = create_test_store(dir.path());

        let records = store
            .get_data_in_range(&DateRange::new(at(1, 0, 0), at(31, 0, 0)))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_metric_names_union() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "HealthMetrics-2025-01-15.csv",
            "Date/Time,Steps,Heart Rate [Avg] (bpm)\n2025-01-15 08:00:00,1,60\n",
        );
        write(
            dir.path(),
            "HealthMetrics-2025-01-16.csv",
            "Date,Steps,Active Energy (kcal)\n2025-01-16 08:00:00,1,2\n",
        );
        let store = create_test_store(dir.path());

        let names = store.metric_names().await.unwrap();
        assert_eq!(
            names,
            vec!["Active Energy (kcal)", "Heart Rate [Avg] (bpm)", "Steps"]
        );
    }

    #[tokio::test]
    async fn test_date_summary() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "HealthMetrics20250114.csv",
            "Date/Time,Steps\n2025-01-14 06:30:00,1\n2025-01-14 22:00:00,1\n",
        );
        write(
            dir.path(),
            "HealthMetrics-2025-01-16.csv",
            "Date/Time,Steps\n2025-01-16 05:00:00,1\n2025-01-16 21:15:00,1\n",
        );
        let store = create_test_store(dir.path());

        let summary = store.date_summary().await.unwrap().unwrap();
        assert_eq!(summary.start, at(14, 6, 30));
        assert_eq!(summary.end, at(16, 21, 15));
        assert_eq!(summary.file_count, 2);

        let empty = tempdir().unwrap();
        let store = create_test_store(empty.path());
        assert!(store.date_summary().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sample_metric_stops_early() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "HealthMetrics-2025-01-15.csv",
            "Date/Time,Steps\n\
             2025-01-15 08:00:00,\n\
             2025-01-15 08:01:00,11\n\
             2025-01-15 08:02:00,12\n",
        );
        write(
            dir.path(),
            "HealthMetrics-2025-01-16.csv",
            "Date/Time,Steps\n2025-01-16 08:00:00,13\n",
        );
        let store = create_test_store(dir.path());

        let samples = store.sample_metric("Steps", 2).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, Value::Number(11.0));
        assert_eq!(samples[1].value, Value::Number(12.0));

        // The second file was never needed
        assert_eq!(store.cache_stats().await.size, 1);

        let all = store.sample_metric("Steps", 10).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_cache_bound_and_clear() {
        let dir = tempdir().unwrap();
        for day in 10..16 {
            write(
                dir.path(),
                &format!("HealthMetrics-2025-01-{day}.csv"),
                &format!("Date/Time,Steps\n2025-01-{day} 08:00:00,1\n"),
            );
        }
        let store =
            TimeSeriesStore::new(StoreConfig::new(dir.path()).zone(Zone::utc()).cache_size(3))
                .unwrap();

        let files = store.load_all_files().await.unwrap();
        assert_eq!(files.len(), 6);

        let stats = store.cache_stats().await;
        assert_eq!(stats.size, 3);
        assert_eq!(stats.files.len(), 3);

        store.clear_cache().await;
        assert_eq!(store.cache_stats().await.size, 0);
    }

    #[test]
    fn test_dedup_keep_last() {
        let records = vec![
            Record::new(at(15, 1, 0)).with("v", 1.0),
            Record::new(at(15, 1, 0)).with("v", 2.0),
            Record::new(at(15, 2, 0)).with("v", 3.0),
        ];

        let deduped = dedup_keep_last(records);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].get("v"), Value::Number(2.0));
    }
}
