//! Dataset writer: partitioned Parquet writes under a [`WriteMode`].
//!
//! Every write validates and splits the whole batch before touching disk.
//! A partition is replaced by a staged swap: the new file is written under a
//! hidden staging name, the partition's previous files are removed, and the
//! staged file is renamed into place. A crash between the last two steps
//! leaves the partition empty with a staging file that readers ignore and
//! warn about; re-running the upsert restores it.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use strata_config::{CompressionCodec, StoreConfig};
use tracing::{debug, info, warn};

use crate::coerce::coerce_batch;
use crate::error::{Result, StoreError};
use crate::layout::{data_file_path, data_files, staging_path, TableLayout};
use crate::partition::{split_by_partition, PartitionValues};
use crate::schema::TableSchema;
use crate::stats::IoStats;

/// How a write treats partitions that already hold files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Write new partitions; leave existing ones untouched.
    CreateOrSkipExisting,
    /// Replace each touched partition with the batch's rows for it.
    ReplaceMatchingPartitions,
    /// Refuse the whole write if any touched partition exists.
    FailIfExists,
}

/// Outcome of one write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub partitions_written: usize,
    pub partitions_skipped: usize,
    pub rows_written: usize,
}

/// Parquet writer properties for `config`.
pub fn writer_properties(config: &StoreConfig) -> Result<WriterProperties> {
    let compression = match config.compression {
        CompressionCodec::Zstd => Compression::ZSTD(ZstdLevel::try_new(config.zstd_level())?),
        CompressionCodec::Snappy => Compression::SNAPPY,
        CompressionCodec::Uncompressed => Compression::UNCOMPRESSED,
    };
    Ok(WriterProperties::builder()
        .set_compression(compression)
        .set_max_row_group_size(config.max_row_group_size)
        .build())
}

/// One partition's share of a write.
struct PartitionWrite {
    values: PartitionValues,
    dir: PathBuf,
    batch: RecordBatch,
    existing: Vec<PathBuf>,
}

/// Writes batches into one root's tables.
#[derive(Debug)]
pub struct DatasetWriter<'a> {
    layout: &'a TableLayout,
    stats: &'a IoStats,
    properties: WriterProperties,
}

impl<'a> DatasetWriter<'a> {
    pub fn new(layout: &'a TableLayout, stats: &'a IoStats, properties: WriterProperties) -> Self {
        Self {
            layout,
            stats,
            properties,
        }
    }

    /// Persist `batch` into `schema`'s table.
    ///
    /// An empty batch is a no-op. Validation and mode conflicts are reported
    /// before any file is created or removed.
    pub fn write(
        &self,
        schema: &TableSchema,
        batch: &RecordBatch,
        mode: WriteMode,
    ) -> Result<WriteSummary> {
        if batch.num_rows() == 0 {
            debug!(table = schema.name(), "empty batch; nothing to write");
            return Ok(WriteSummary::default());
        }

        let batch = coerce_batch(schema, batch)?;
        let plan = self.plan(schema, &batch)?;

        if mode == WriteMode::FailIfExists {
            if let Some(conflict) = plan.iter().find(|p| !p.existing.is_empty()) {
                return Err(StoreError::PartitionWriteConflict {
                    path: conflict.dir.clone(),
                });
            }
        }

        self.ensure_definition(schema)?;

        let mut summary = WriteSummary::default();
        for partition in plan {
            if mode == WriteMode::CreateOrSkipExisting && !partition.existing.is_empty() {
                debug!(
                    table = schema.name(),
                    partition = %partition.values,
                    "partition exists; skipped"
                );
                self.stats.record_skipped();
                summary.partitions_skipped += 1;
                continue;
            }

            self.replace_partition(&partition)?;
            summary.partitions_written += 1;
            summary.rows_written += partition.batch.num_rows();
        }

        info!(
            table = schema.name(),
            mode = ?mode,
            partitions_written = summary.partitions_written,
            partitions_skipped = summary.partitions_skipped,
            rows = summary.rows_written,
            "batch written"
        );
        Ok(summary)
    }

    fn plan(&self, schema: &TableSchema, batch: &RecordBatch) -> Result<Vec<PartitionWrite>> {
        split_by_partition(schema, batch)?
            .into_iter()
            .map(|(values, batch)| {
                let dir = self.layout.partition_dir(schema.name(), &values);
                let existing = data_files(&dir)?;
                Ok(PartitionWrite {
                    values,
                    dir,
                    batch,
                    existing,
                })
            })
            .collect()
    }

    /// Record the definition next to the data when it is new or has changed.
    fn ensure_definition(&self, schema: &TableSchema) -> Result<()> {
        let persisted = self.layout.read_definition(schema.name())?;
        if persisted.as_ref() != Some(schema.definition()) {
            if persisted.is_none() {
                info!(table = schema.name(), "creating table");
            }
            self.layout.write_definition(schema.definition())?;
        }
        Ok(())
    }

    /// Staged swap of one partition's contents.
    fn replace_partition(&self, partition: &PartitionWrite) -> Result<()> {
        fs::create_dir_all(&partition.dir).map_err(|e| StoreError::io(&partition.dir, e))?;

        let staged = staging_path(&partition.dir);
        if let Err(e) = self.write_file(&staged, &partition.batch) {
            if let Err(cleanup) = fs::remove_file(&staged) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %staged.display(), error = %cleanup, "failed to remove staging file");
                }
            }
            return Err(e);
        }

        for old in &partition.existing {
            fs::remove_file(old).map_err(|e| StoreError::io(old, e))?;
        }
        if !partition.existing.is_empty() {
            self.stats.record_replaced();
        }

        let target = data_file_path(&partition.dir);
        fs::rename(&staged, &target).map_err(|e| StoreError::io(&target, e))?;
        self.stats.record_file_written();

        debug!(
            partition = %partition.values,
            path = %target.display(),
            rows = partition.batch.num_rows(),
            replaced_files = partition.existing.len(),
            "partition written"
        );
        Ok(())
    }

    fn write_file(&self, path: &Path, batch: &RecordBatch) -> Result<()> {
        let file = File::create(path).map_err(|e| StoreError::io(path, e))?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(self.properties.clone()))?;
        writer.write(batch)?;
        writer.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_properties_from_config() {
        let config = StoreConfig::new("/tmp/strata").with_compression(CompressionCodec::Snappy);
        let props = writer_properties(&config).unwrap();
        assert_eq!(props.max_row_group_size(), config.max_row_group_size);

        let mut config = StoreConfig::new("/tmp/strata");
        config.compression_level = Some(99);
        assert!(writer_properties(&config).is_err());
    }

    #[test]
    fn test_write_mode_serde_names() {
        let mode: WriteMode = serde_json::from_str("\"replace_matching_partitions\"").unwrap();
        assert_eq!(mode, WriteMode::ReplaceMatchingPartitions);
    }
}
