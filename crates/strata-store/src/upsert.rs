//! Upsert coordinator: scoped read-merge-rewrite by primary key.
//!
//! Only the partitions a batch touches are read and rewritten, so the cost of
//! an upsert follows the size of those partitions plus the batch, never the
//! size of the table.

use std::collections::HashSet;

use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::compute::{concat_batches, take_record_batch};
use arrow::record_batch::RecordBatch;
use arrow::row::{RowConverter, Rows, SortField};
use serde::Serialize;
use tracing::{debug, info};

use crate::coerce::coerce_batch;
use crate::error::{Result, StoreError};
use crate::layout::TableLayout;
use crate::partition::partition_rows;
use crate::predicate::{FilterSpec, Predicate};
use crate::reader::DatasetReader;
use crate::schema::TableSchema;
use crate::writer::{DatasetWriter, WriteMode};

/// Outcome of one upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    /// Rows in the rewritten partitions after the merge.
    pub rows_written: usize,
    /// Existing rows replaced by a row of the batch.
    pub rows_superseded: usize,
    /// Existing rows read from the touched partitions.
    pub existing_rows_read: usize,
    pub partitions_rewritten: usize,
    /// Whether this upsert created the table.
    pub created_table: bool,
}

/// Check caller-supplied keys against the registered table.
pub fn check_keys(schema: &TableSchema, primary_key: &[String], partition_columns: &[String]) -> Result<()> {
    if primary_key.is_empty() {
        return Err(StoreError::invalid_schema(
            schema.name(),
            "upsert requires a primary key",
        ));
    }
    for column in primary_key {
        if schema.field(column).is_none() {
            return Err(StoreError::invalid_schema(
                schema.name(),
                format!("primary key column '{}' is not a field", column),
            ));
        }
    }
    if partition_columns != schema.partition_columns() {
        return Err(StoreError::invalid_schema(
            schema.name(),
            format!(
                "partition columns {:?} do not match the table layout {:?}",
                partition_columns,
                schema.partition_columns()
            ),
        ));
    }
    Ok(())
}

/// Primary-key tuples of a schema-coerced batch in Arrow row format.
struct KeyEncoder {
    indices: Vec<usize>,
    converter: RowConverter,
}

impl KeyEncoder {
    fn new(schema: &TableSchema, primary_key: &[String]) -> Result<Self> {
        let indices = primary_key
            .iter()
            .map(|column| {
                schema.column_index(column).ok_or_else(|| {
                    StoreError::invalid_schema(
                        schema.name(),
                        format!("primary key column '{}' is not a field", column),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let fields = indices
            .iter()
            .map(|&i| SortField::new(schema.arrow_schema().field(i).data_type().clone()))
            .collect();
        Ok(Self {
            indices,
            converter: RowConverter::new(fields)?,
        })
    }

    fn encode(&self, batch: &RecordBatch) -> Result<Rows> {
        let columns: Vec<ArrayRef> = self
            .indices
            .iter()
            .map(|&i| batch.column(i).clone())
            .collect();
        Ok(self.converter.convert_columns(&columns)?)
    }

    /// Reject null key values; a null never identifies a row.
    fn check_nulls(&self, batch: &RecordBatch) -> Result<()> {
        for &i in &self.indices {
            let column = batch.column(i);
            if column.null_count() > 0 {
                let row = (0..column.len()).find(|&r| column.is_null(r));
                return Err(StoreError::MissingPrimaryKeyColumn {
                    column: batch.schema().field(i).name().clone(),
                    row,
                });
            }
        }
        Ok(())
    }
}

/// Keep only the last row for each key, preserving batch order otherwise.
fn dedupe_keep_last(batch: &RecordBatch, keys: &Rows) -> Result<RecordBatch> {
    let mut seen = HashSet::with_capacity(keys.num_rows());
    let mut keep: Vec<u32> = Vec::with_capacity(keys.num_rows());
    for row in (0..keys.num_rows()).rev() {
        if seen.insert(keys.row(row)) {
            keep.push(row as u32);
        }
    }
    if keep.len() == batch.num_rows() {
        return Ok(batch.clone());
    }
    keep.reverse();
    debug!(
        duplicates = batch.num_rows() - keep.len(),
        "dropped earlier duplicates of keys within batch"
    );
    Ok(take_record_batch(batch, &UInt32Array::from(keep))?)
}

/// Runs upserts against one root.
pub struct UpsertCoordinator<'a> {
    layout: &'a TableLayout,
    reader: DatasetReader<'a>,
    writer: &'a DatasetWriter<'a>,
}

impl<'a> UpsertCoordinator<'a> {
    pub fn new(
        layout: &'a TableLayout,
        reader: DatasetReader<'a>,
        writer: &'a DatasetWriter<'a>,
    ) -> Self {
        Self {
            layout,
            reader,
            writer,
        }
    }

    /// Merge `batch` into the partitions it touches, keyed by `primary_key`.
    ///
    /// Existing rows whose key appears in `batch` are superseded; all other
    /// rows of the touched partitions are kept. Partitions outside the batch
    /// are neither read nor written.
    pub fn upsert(
        &self,
        schema: &TableSchema,
        batch: &RecordBatch,
        primary_key: &[String],
    ) -> Result<UpsertSummary> {
        if batch.num_rows() == 0 {
            debug!(table = schema.name(), "empty batch; nothing to upsert");
            return Ok(UpsertSummary::default());
        }

        let keys = KeyEncoder::new(schema, primary_key)?;
        let incoming = coerce_batch(schema, batch)?;
        keys.check_nulls(&incoming)?;
        let incoming = dedupe_keep_last(&incoming, &keys.encode(&incoming)?)?;

        let partitions = partition_rows(schema, &incoming)?;

        if !self.layout.table_exists(schema.name()) {
            let written = self
                .writer
                .write(schema, &incoming, WriteMode::CreateOrSkipExisting)?;
            info!(
                table = schema.name(),
                rows = written.rows_written,
                partitions = written.partitions_written,
                "upsert created table"
            );
            return Ok(UpsertSummary {
                rows_written: written.rows_written,
                partitions_rewritten: written.partitions_written,
                created_table: true,
                ..UpsertSummary::default()
            });
        }

        // Without partition columns the whole table is the one partition.
        let predicate = if schema.partition_columns().is_empty() {
            None
        } else {
            let spec = FilterSpec::partition_selection(schema, partitions.keys())?;
            Some(Predicate::compile(&spec, schema)?)
        };

        let existing = self.reader.read(schema, predicate.as_ref(), None)?;

        let new_keys = keys.encode(&incoming)?;
        let existing_keys = keys.encode(&existing)?;
        let superseding: HashSet<_> = new_keys.iter().collect();

        let kept: Vec<u32> = existing_keys
            .iter()
            .enumerate()
            .filter(|(_, key)| !superseding.contains(key))
            .map(|(i, _)| i as u32)
            .collect();
        let rows_superseded = existing.num_rows() - kept.len();
        let kept = take_record_batch(&existing, &UInt32Array::from(kept))?;

        let replacement = concat_batches(schema.arrow_schema(), [&kept, &incoming])?;
        let written = self
            .writer
            .write(schema, &replacement, WriteMode::ReplaceMatchingPartitions)?;

        let summary = UpsertSummary {
            rows_written: written.rows_written,
            rows_superseded,
            existing_rows_read: existing.num_rows(),
            partitions_rewritten: written.partitions_written,
            created_table: false,
        };
        info!(
            table = schema.name(),
            partitions = summary.partitions_rewritten,
            existing_rows = summary.existing_rows_read,
            superseded = summary.rows_superseded,
            rows = summary.rows_written,
            "upsert complete"
        );
        Ok(summary)
    }
}
