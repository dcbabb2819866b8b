//! Record sources for the query executor

use async_trait::async_trait;

use crate::storage::engine::TimeSeriesStore;
use crate::storage::error::StorageResult;
use crate::storage::types::{DateRange, Record};
use crate::storage::zone::Zone;

/// Anything that can serve time-ordered records for a date range
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Records with a timestamp in `range`, sorted ascending
    async fn records_in_range(&self, range: &DateRange) -> StorageResult<Vec<Record>>;

    /// Span of all available data, if any
    async fn full_range(&self) -> StorageResult<Option<DateRange>>;

    /// Zone for bucketing and rendering wall-clock times
    fn zone(&self) -> Zone;
}

#[async_trait]
impl RecordSource for TimeSeriesStore {
    async fn records_in_range(&self, range: &DateRange) -> StorageResult<Vec<Record>> {
        self.get_data_in_range(range).await
    }

    async fn full_range(&self) -> StorageResult<Option<DateRange>> {
        Ok(self.date_summary().await?.map(|s| s.range()))
    }

    fn zone(&self) -> Zone {
        TimeSeriesStore::zone(self)
    }
}

/// In-memory record source
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<Record>,
    zone: Zone,
}

impl MemorySource {
    pub fn new(mut records: Vec<Record>, zone: Zone) -> Self {
        records.sort_by_key(|r| r.timestamp);
        Self { records, zone }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn records_in_range(&self, range: &DateRange) -> StorageResult<Vec<Record>> {
        Ok(self
            .records
            .iter()
            .filter(|r| range.contains(r.timestamp))
            .cloned()
            .collect())
    }

    async fn full_range(&self) -> StorageResult<Option<DateRange>> {
        Ok(match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) => Some(DateRange::new(first.timestamp, last.timestamp)),
            _ => None,
        })
    }

    fn zone(&self) -> Zone {
        self.zone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_memory_source_range() {
        let t = |h| Utc.with_ymd_and_hms(2025, 1, 15, h, 0, 0).unwrap();
        let source = MemorySource::new(
            vec![
                Record::new(t(9)).with("v", 3.0),
                Record::new(t(7)).with("v", 1.0),
                Record::new(t(8)).with("v", 2.0),
            ],
            Zone::utc(),
        );

        let full = source.full_range().await.unwrap().unwrap();
        assert_eq!(full, DateRange::new(t(7), t(9)));

        let records = source
            .records_in_range(&DateRange::new(t(8), t(9)))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, t(8));
    }
}
