//! Error types shared by Strata crates.

use thiserror::Error;

/// Result type alias for shared Strata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the shared types and bootstrap helpers.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid table name '{0}': use ASCII letters, digits, '_' or '-', not starting with '_', '.' or '-'")]
    InvalidTableName(String),

    #[error("unknown granularity '{0}' (expected 'day' or 'month')")]
    UnknownGranularity(String),

    #[error("unknown field type '{0}'")]
    UnknownFieldType(String),

    #[error("unknown log format '{0}' (expected 'pretty' or 'json')")]
    UnknownLogFormat(String),

    #[error("logging initialization failed: {0}")]
    Logging(String),
}

impl Error {
    /// Returns the numeric code for this error.
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidTableName(_) => 10,
            Error::UnknownGranularity(_) => 11,
            Error::UnknownFieldType(_) => 12,
            Error::UnknownLogFormat(_) => 13,
            Error::Logging(_) => 20,
        }
    }
}
