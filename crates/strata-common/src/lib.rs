//! Strata common types, names, and errors.
//!
//! This crate provides foundational types shared across the Strata crates:
//! - Table definitions and field types
//! - Validated table names
//! - On-disk format versioning
//! - Logging bootstrap

pub mod error;
pub mod id;
pub mod logging;
pub mod schema;

pub use error::{Error, Result};
pub use id::TableName;
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use schema::{
    FieldSpec, FieldType, Granularity, PersistedDefinition, TableDefinition, TimePartitioning,
    FORMAT_VERSION,
};
