//! Error types for table storage operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
///
/// Validation errors (schema, column, filter problems) are always raised
/// before any file is touched. The I/O family (`Io`, `Parquet`, `Arrow`,
/// `Json`) may surface mid-write and leave a partition in an indeterminate
/// state; callers retry, which is safe for upserts.
#[derive(Error, Debug)]
pub enum StoreError {
    // Schema errors (10-19)
    #[error("no schema registered for table '{0}'")]
    SchemaNotFound(String),

    #[error("invalid schema for table '{table}': {reason}")]
    InvalidSchema { table: String, reason: String },

    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    // Batch validation errors (20-29)
    #[error("partition column '{column}' missing{}", row_suffix(.row))]
    MissingPartitionColumn { column: String, row: Option<usize> },

    #[error("primary key column '{column}' missing{}", row_suffix(.row))]
    MissingPrimaryKeyColumn { column: String, row: Option<usize> },

    #[error("invalid timestamp in column '{column}': {reason}")]
    InvalidTimestamp { column: String, reason: String },

    // Filter errors (30-39)
    #[error("malformed filter: {0}")]
    MalformedFilter(String),

    // Write conflicts (40-49)
    #[error("partition already has files: {}", .path.display())]
    PartitionWriteConflict { path: PathBuf },

    // I/O errors (60-69)
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn row_suffix(row: &Option<usize>) -> String {
    match row {
        Some(row) => format!(" at row {}", row),
        None => String::new(),
    }
}

impl StoreError {
    /// Returns the numeric code for this error.
    pub fn code(&self) -> u32 {
        match self {
            StoreError::SchemaNotFound(_) => 10,
            StoreError::InvalidSchema { .. } => 11,
            StoreError::UnknownColumn { .. } => 12,
            StoreError::MissingPartitionColumn { .. } => 20,
            StoreError::MissingPrimaryKeyColumn { .. } => 21,
            StoreError::InvalidTimestamp { .. } => 22,
            StoreError::MalformedFilter(_) => 30,
            StoreError::PartitionWriteConflict { .. } => 40,
            StoreError::Io { .. } => 60,
            StoreError::Parquet(_) => 61,
            StoreError::Arrow(_) => 62,
            StoreError::Json(_) => 63,
        }
    }

    /// Whether this error came from the storage layer rather than validation.
    pub fn is_io_failure(&self) -> bool {
        self.code() >= 60
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_schema(table: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::InvalidSchema {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_family() {
        let err = StoreError::io("/x", std::io::Error::other("disk gone"));
        assert!(err.is_io_failure());
        assert!(err.to_string().contains("/x"));

        let err = StoreError::MalformedFilter("bad".into());
        assert!(!err.is_io_failure());
    }

    #[test]
    fn test_missing_column_messages() {
        let err = StoreError::MissingPartitionColumn {
            column: "date".into(),
            row: Some(3),
        };
        assert_eq!(err.to_string(), "partition column 'date' missing at row 3");

        let err = StoreError::MissingPrimaryKeyColumn {
            column: "id".into(),
            row: None,
        };
        assert_eq!(err.to_string(), "primary key column 'id' missing");
    }
}
