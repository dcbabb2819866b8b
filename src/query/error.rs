//! Query error types
//!
//! Defines all error conditions that can occur during query parsing and execution.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// The query text could not be parsed
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Unknown output format name
    #[error("Unknown output format: {0}")]
    UnknownFormat(String),

    /// Evaluation failed after parsing
    #[error("Query execution failed: {message}")]
    Execution {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Storage layer error while fetching records
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl QueryError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    pub(crate) fn execution(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Whether running the same query again might succeed
    ///
    /// Only storage I/O faults qualify; a query that failed to parse or
    /// evaluate fails the same way until its text changes.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Storage(StorageError::Io(_) | StorageError::Discovery { .. })
        )
    }
}

/// Result type for query operations
pub type QueryOutcome<T> = Result<T, QueryError>;
