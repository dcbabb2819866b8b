//! # Health SQL
//!
//! SQL-subset queries over time-series health records exported as one CSV
//! file per day.
//!
//! ## Features
//!
//! - **Date-aware reads**: only files whose day overlaps the range are parsed
//! - **Bounded cache**: parsed files kept in insertion order up to a capacity
//! - **Deduplication**: one record per timestamp, later files win
//! - **SQL subset**: filters, time buckets, aggregates, ordering, pagination
//! - **Three output shapes**: json, csv and per-column summary
//!
//! ## Modules
//!
//! - [`storage`]: File discovery, CSV parsing, cache and range reads
//! - [`query`]: Query language parser and executor
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use health_sql::query::{QueryExecutor, QueryOptions};
//! use health_sql::storage::{StoreConfig, TimeSeriesStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(TimeSeriesStore::new(StoreConfig::new("./exports"))?);
//!     let executor = QueryExecutor::new(store);
//!
//!     let result = executor
//!         .execute_str(
//!             "SELECT DATE(timestamp), SUM(`Step Count (steps)`) FROM health_data \
//!              GROUP BY DATE(timestamp) ORDER BY DATE(timestamp) DESC LIMIT 7",
//!             None,
//!             QueryOptions::default(),
//!         )
//!         .await?;
//!
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod query;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    DateRange, Record, RecordSource, StorageError, StorageResult, StoreConfig, TimeSeriesStore,
    Value, Zone,
};

pub use query::{
    parse_query, OutputFormat, ParsedQuery, QueryError, QueryExecutor, QueryOptions, QueryOutcome,
    QueryResult,
};

pub use config::{Config, ConfigError, LoggingConfig, QuerySettings, StorageSettings};
