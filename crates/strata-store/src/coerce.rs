//! Typed coercion of incoming batches to a table schema.
//!
//! Each schema field is mapped to exactly one [`ColumnSource`]: a column of
//! the incoming batch (cast to the field's Arrow type) or a null-filled
//! column. Batch columns the schema does not know are dropped. Planning fails
//! before any data is touched when a key column is missing.

use arrow::array::{new_null_array, Array, ArrayRef, AsArray};
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{Date32Type, Schema, TimestampMicrosecondType};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use strata_common::FieldType;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::scalar::days_to_date;
use crate::schema::{arrow_type, TableSchema};

/// Where a schema field's values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    /// Column at this index of the incoming batch.
    Batch(usize),
    /// Field absent from the batch; filled with nulls.
    NullFilled,
}

/// Field-by-field mapping from an input schema to a table schema.
#[derive(Debug, Clone)]
pub struct CoercionPlan {
    sources: Vec<ColumnSource>,
    dropped: Vec<String>,
}

impl CoercionPlan {
    /// Plan the coercion of batches shaped like `input`.
    pub fn build(schema: &TableSchema, input: &Schema) -> Result<Self> {
        let mut sources = Vec::with_capacity(schema.fields().len());

        for field in schema.fields() {
            let source = match input.index_of(&field.name) {
                Ok(index) => ColumnSource::Batch(index),
                Err(_) if schema.is_partition_column(&field.name) => {
                    return Err(StoreError::MissingPartitionColumn {
                        column: field.name.clone(),
                        row: None,
                    });
                }
                Err(_) if schema.is_primary_key(&field.name) => {
                    return Err(StoreError::MissingPrimaryKeyColumn {
                        column: field.name.clone(),
                        row: None,
                    });
                }
                Err(_) if !field.nullable => {
                    return Err(StoreError::invalid_schema(
                        schema.name(),
                        format!("required field '{}' absent from batch", field.name),
                    ));
                }
                Err(_) => ColumnSource::NullFilled,
            };
            sources.push(source);
        }

        let dropped = input
            .fields()
            .iter()
            .filter(|f| schema.field(f.name()).is_none())
            .map(|f| f.name().clone())
            .collect();

        Ok(Self { sources, dropped })
    }

    pub fn sources(&self) -> &[ColumnSource] {
        &self.sources
    }

    /// Batch columns that are not schema fields.
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    /// Produce a batch with exactly the schema's fields, in schema order.
    pub fn apply(&self, schema: &TableSchema, batch: &RecordBatch) -> Result<RecordBatch> {
        let rows = batch.num_rows();
        let options = CastOptions {
            safe: false,
            ..Default::default()
        };

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.sources.len());
        for (field, source) in schema.fields().iter().zip(&self.sources) {
            let target = arrow_type(field.field_type);
            let column = match source {
                ColumnSource::Batch(index) => {
                    let column = batch.column(*index);
                    if column.data_type() == &target {
                        column.clone()
                    } else {
                        cast_with_options(column, &target, &options).map_err(|e| {
                            StoreError::invalid_schema(
                                schema.name(),
                                format!(
                                    "column '{}' ({}) cannot be read as {}: {}",
                                    field.name,
                                    column.data_type(),
                                    field.field_type,
                                    e
                                ),
                            )
                        })?
                    }
                }
                ColumnSource::NullFilled => new_null_array(&target, rows),
            };
            columns.push(column);
        }

        check_nulls(schema, &columns)?;
        check_calendar_range(schema, &columns)?;

        if !self.dropped.is_empty() {
            debug!(table = schema.name(), dropped = ?self.dropped, "dropped columns not in schema");
        }

        Ok(RecordBatch::try_new(schema.arrow_schema().clone(), columns)?)
    }
}

/// Coerce `batch` to `schema` and validate key columns.
pub fn coerce_batch(schema: &TableSchema, batch: &RecordBatch) -> Result<RecordBatch> {
    CoercionPlan::build(schema, &batch.schema())?.apply(schema, batch)
}

fn first_null(array: &dyn Array) -> Option<usize> {
    if array.null_count() == 0 {
        return None;
    }
    (0..array.len()).find(|&i| array.is_null(i))
}

/// Key columns never hold nulls; required fields never hold nulls.
fn check_nulls(schema: &TableSchema, columns: &[ArrayRef]) -> Result<()> {
    for (field, column) in schema.fields().iter().zip(columns) {
        let Some(row) = first_null(column.as_ref()) else {
            continue;
        };
        if schema.is_partition_column(&field.name) {
            return Err(StoreError::MissingPartitionColumn {
                column: field.name.clone(),
                row: Some(row),
            });
        }
        if schema.is_primary_key(&field.name) {
            return Err(StoreError::MissingPrimaryKeyColumn {
                column: field.name.clone(),
                row: Some(row),
            });
        }
        if !field.nullable {
            return Err(StoreError::invalid_schema(
                schema.name(),
                format!("required field '{}' is null at row {}", field.name, row),
            ));
        }
    }
    Ok(())
}

/// Dates and timestamps must map to a calendar value.
fn check_calendar_range(schema: &TableSchema, columns: &[ArrayRef]) -> Result<()> {
    for (field, column) in schema.fields().iter().zip(columns) {
        let row = match field.field_type {
            FieldType::Date => {
                let days = column.as_primitive::<Date32Type>();
                (0..days.len()).find(|&i| days.is_valid(i) && days_to_date(days.value(i)).is_none())
            }
            FieldType::Timestamp => {
                let micros = column.as_primitive::<TimestampMicrosecondType>();
                (0..micros.len()).find(|&i| {
                    micros.is_valid(i) && DateTime::from_timestamp_micros(micros.value(i)).is_none()
                })
            }
            _ => None,
        };
        if let Some(row) = row {
            return Err(StoreError::invalid_schema(
                schema.name(),
                format!("{} field '{}' is out of range at row {}", field.field_type, field.name, row),
            ));
        }
    }
    Ok(())
}
