//! Health Metric Store
//!
//! This module provides the time-series store over per-day CSV exports:
//!
//! - **types**: Record model (Value, Record, SourceFile, DateRange)
//! - **zone**: Wall-clock zone for naive timestamps
//! - **discovery**: Filename conventions and directory scanning
//! - **csv_file**: Parsing one export into records
//! - **cache**: Bounded insertion-order file cache
//! - **engine**: The store orchestrating all of the above
//! - **source**: The `RecordSource` seam used by the query executor
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Read Path:
//!   Range → Discover → Skip non-overlapping days → Load (cache) → Filter → Sort → Dedup
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use health_sql::storage::{DateRange, StoreConfig, TimeSeriesStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = TimeSeriesStore::new(StoreConfig::new("./exports"))?;
//!
//!     let records = store.get_data_in_range(&DateRange::last_days(7)).await?;
//!     println!("Found {} records", records.len());
//!
//!     println!("Metrics: {:?}", store.metric_names().await?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod csv_file;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod source;
pub mod types;
pub mod zone;

// Re-export commonly used types
pub use cache::FileCache;
pub use csv_file::{parse_timestamp, CsvFileParser, ParsedFile, TIMESTAMP_HEADERS};
pub use discovery::{discover_files, FileNaming};
pub use engine::{StoreConfig, TimeSeriesStore};
pub use error::{StorageError, StorageResult};
pub use source::{MemorySource, RecordSource};
pub use types::{
    CacheStats, DateRange, DateSummary, MetricSample, Record, SourceFile, Value, TIMESTAMP_COLUMN,
};
pub use zone::Zone;
