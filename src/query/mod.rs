//! Health SQL Query Engine
//!
//! Provides a restricted SQL dialect over the record sequences served by the
//! store:
//!
//! - **AST**: Parsed query types and filter evaluation
//! - **Parser**: Parse query strings into the AST
//! - **Executor**: Filter, group, sort and paginate records
//! - **Format**: Render results as json, csv or summary
//!
//! # Query Language
//!
//! ```text
//! SELECT item [AS alias] [, ...] FROM health_data
//! [WHERE cond [AND cond ...]]
//! [GROUP BY expr [, ...]]
//! [ORDER BY expr [ASC|DESC] [, ...]]
//! [LIMIT n [OFFSET m]]
//! ```
//!
//! # Examples
//!
//! ## Using Query Builder
//!
//! ```rust,ignore
//! use health_sql::query::{ColumnExpr, ParsedQuery, SelectItem, TimeBucket, AggregateFunc};
//!
//! let query = ParsedQuery::select(vec![
//!     SelectItem::new(ColumnExpr::Bucket(TimeBucket::Date)),
//!     SelectItem::new(ColumnExpr::Aggregate(AggregateFunc::Sum, "Step Count (steps)".into())),
//! ])
//! .group_by(ColumnExpr::Bucket(TimeBucket::Date))
//! .build();
//!
//! let result = executor.execute(query, None, QueryOptions::default()).await?;
//! ```
//!
//! ## Using Query String
//!
//! ```rust,ignore
//! let result = executor
//!     .execute_str(
//!         "SELECT WEEK(timestamp), AVG(`Resting Heart Rate (bpm)`) FROM health_data \
//!          GROUP BY WEEK(timestamp)",
//!         None,
//!         QueryOptions::default(),
//!     )
//!     .await?;
//! ```

mod ast;
mod error;
mod executor;
mod format;
mod parser;

pub use ast::{
    AggregateFunc, ColumnExpr, ColumnLookup, FilterOp, FilterValue, OrderBy, ParsedQuery,
    QueryBuilder, QueryFilter, Row, SelectItem, SortDirection, TimeBucket, DEFAULT_SOURCE,
};
pub use error::{QueryError, QueryOutcome};
pub use executor::{compare_values, execute_records, QueryExecutor, QueryOptions, QueryResult};
pub use format::{csv_cell, json_cell, render, OutputFormat};
pub use parser::{coerce_literal, parse_query, parse_query_in};
