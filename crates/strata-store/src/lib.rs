//! Strata table storage.
//!
//! This crate provides:
//! - A schema registry with typed batch coercion
//! - Time-based partition key derivation (day or month)
//! - DNF filter compilation for partition pruning and row filtering
//! - A Hive-partitioned Parquet reader and writer
//! - Scoped upsert: read, merge by primary key, and rewrite only touched partitions
//!
//! ```no_run
//! use strata_config::StoreConfig;
//! use strata_store::{FilterSpec, TableStore};
//!
//! # fn run(batch: arrow::record_batch::RecordBatch) -> strata_store::Result<()> {
//! let store = TableStore::open(StoreConfig::new("/var/lib/strata"))?;
//! store.upsert("heart_rate", &batch)?;
//! let filter = FilterSpec::from_json_str(r#"[["date", ">=", "2026-01-01"]]"#)?;
//! let rows = store.read("heart_rate", Some(&filter), None)?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod coerce;
pub mod error;
pub mod layout;
pub mod partition;
pub mod predicate;
pub mod reader;
pub mod scalar;
pub mod schema;
pub mod stats;
pub mod store;
pub mod upsert;
pub mod writer;

pub use coerce::{coerce_batch, CoercionPlan, ColumnSource};
pub use error::{Result, StoreError};
pub use layout::{PartitionInfo, TableLayout};
pub use partition::{derive_partition_key, partition_key, PartitionValues};
pub use predicate::{Clause, FilterSpec, Operator, Predicate, Residual};
pub use reader::DatasetReader;
pub use scalar::Scalar;
pub use schema::{SchemaRegistry, TableSchema};
pub use stats::{IoStats, IoStatsSnapshot};
pub use store::TableStore;
pub use upsert::{UpsertCoordinator, UpsertSummary};
pub use writer::{DatasetWriter, WriteMode, WriteSummary};
