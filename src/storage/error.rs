//! Storage error types
//!
//! Discovery failures are fatal to the discovery call. Everything else is
//! scoped to one file: single-file operations return it to the caller,
//! aggregate operations log it and leave the file out.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// The data directory could not be enumerated
    #[error("File discovery failed in {path:?}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source file could not be opened
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),

    /// The file's CSV structure could not be read
    #[error("CSV parse error in {path:?}: {message}")]
    CsvParse { path: PathBuf, message: String },

    /// The filename does not carry a valid date
    #[error("Invalid filename, no date found: {0:?}")]
    InvalidFilename(PathBuf),

    /// A timestamp cell matched none of the known formats
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Store configuration is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// A blocking parse task panicked or was cancelled
    #[error("Load task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::TaskJoin(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::InvalidFilename(PathBuf::from("HealthMetrics-latest.csv"));
        assert_eq!(
            err.to_string(),
            "Invalid filename, no date found: \"HealthMetrics-latest.csv\""
        );

        let err = StorageError::InvalidTimestamp("yesterday-ish".to_string());
        assert_eq!(err.to_string(), "Invalid timestamp: yesterday-ish");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let storage_err: StorageError = io_err.into();
        assert!(matches!(storage_err, StorageError::Io(_)));
    }
}
