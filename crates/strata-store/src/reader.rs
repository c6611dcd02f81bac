//! Dataset reader: pruned, filtered, projected table scans.

use std::fs::File;
use std::path::Path;

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

use crate::coerce::coerce_batch;
use crate::error::{Result, StoreError};
use crate::layout::{PartitionInfo, TableLayout};
use crate::predicate::{Predicate, Residual};
use crate::schema::TableSchema;
use crate::stats::IoStats;

/// Reads rows of one root's tables.
#[derive(Debug, Clone, Copy)]
pub struct DatasetReader<'a> {
    layout: &'a TableLayout,
    stats: &'a IoStats,
}

impl<'a> DatasetReader<'a> {
    pub fn new(layout: &'a TableLayout, stats: &'a IoStats) -> Self {
        Self { layout, stats }
    }

    /// Materialize the rows of `schema`'s table matching `predicate`.
    ///
    /// Partitions are pruned first, then rows are filtered by whatever the
    /// partition values could not decide, then columns are projected.
    /// Missing tables and fully pruned reads return an empty batch.
    pub fn read(
        &self,
        schema: &TableSchema,
        predicate: Option<&Predicate>,
        columns: Option<&[&str]>,
    ) -> Result<RecordBatch> {
        let projection = columns
            .map(|columns| projection_indices(schema, columns))
            .transpose()?;

        let partitions = self.candidate_partitions(schema, predicate)?;

        let mut batches = Vec::new();
        for partition in &partitions {
            let residual = match predicate {
                Some(predicate) => predicate.residual(schema, &partition.values),
                None => Residual::All,
            };
            if residual == Residual::Nothing {
                debug!(table = schema.name(), partition = %partition.values, "partition pruned");
                continue;
            }

            self.stats.record_scan();
            for path in &partition.files {
                for batch in self.read_file(schema, path)? {
                    let batch = match &residual {
                        Residual::Filter(rest) => rest.filter(&batch)?,
                        _ => batch,
                    };
                    if batch.num_rows() > 0 {
                        batches.push(batch);
                    }
                }
            }
        }

        let combined = concat_batches(schema.arrow_schema(), &batches)?;
        debug!(
            table = schema.name(),
            partitions = partitions.len(),
            rows = combined.num_rows(),
            "table read"
        );

        match projection {
            Some(indices) => Ok(combined.project(&indices)?),
            None => Ok(combined),
        }
    }

    /// Partitions that may hold matching rows.
    ///
    /// A predicate that pins every partition column with `=` opens the named
    /// directories directly; anything else lists the table.
    pub fn candidate_partitions(
        &self,
        schema: &TableSchema,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<PartitionInfo>> {
        if let Some(exact) = predicate.and_then(|p| p.exact_partitions(schema)) {
            let mut found = Vec::with_capacity(exact.len());
            for values in &exact {
                if let Some(info) = self.layout.partition(schema.name(), values)? {
                    found.push(info);
                }
            }
            debug!(
                table = schema.name(),
                requested = exact.len(),
                found = found.len(),
                "opened partitions directly"
            );
            return Ok(found);
        }

        let partitions = self.layout.list_partitions(schema)?;
        self.stats.record_listed(partitions.len());
        Ok(partitions)
    }

    /// Decode one Parquet file and coerce it to the current schema.
    ///
    /// A file removed between listing and opening was superseded by a
    /// concurrent partition replace and contributes no rows.
    fn read_file(&self, schema: &TableSchema, path: &Path) -> Result<Vec<RecordBatch>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(table = schema.name(), path = %path.display(), "data file replaced during read");
                return Ok(Vec::new());
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut batches = Vec::new();
        let mut rows = 0;
        for batch in reader {
            let batch = batch?;
            rows += batch.num_rows();
            batches.push(coerce_batch(schema, &batch)?);
        }
        self.stats.record_file_read(rows);
        Ok(batches)
    }
}

fn projection_indices(schema: &TableSchema, columns: &[&str]) -> Result<Vec<usize>> {
    columns
        .iter()
        .map(|column| {
            schema
                .column_index(column)
                .ok_or_else(|| StoreError::UnknownColumn {
                    table: schema.name().to_string(),
                    column: column.to_string(),
                })
        })
        .collect()
}
