//! Partition keys: derivation, identity, and Hive-style path encoding.
//!
//! # Granularity
//!
//! Every upsert rewrites each partition its batch touches. Daily partitions on
//! frequently re-ingested data multiply the partitions rewritten per run;
//! monthly partitions bound that count at the cost of larger partitions being
//! scanned on read. Tables choose per-table via [`Granularity`].

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, StringArray, UInt32Array};
use arrow::compute::{cast, take_record_batch};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit, TimestampMicrosecondType};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use strata_common::Granularity;

use crate::error::{Result, StoreError};
use crate::scalar::{days_to_date, parse_timestamp, Scalar};
use crate::schema::{TableSchema, UTC};

/// Canonical partition key for a date.
pub fn partition_key(date: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => date.format("%Y-%m-%d").to_string(),
        Granularity::Month => date.format("%Y-%m-01").to_string(),
    }
}

/// Add (or replace) `target_column` with keys derived from `source_column`.
///
/// Rejects the whole batch with `InvalidTimestamp` if any row is null or
/// unparseable.
pub fn derive_partition_key(
    batch: &RecordBatch,
    source_column: &str,
    target_column: &str,
    granularity: Granularity,
) -> Result<RecordBatch> {
    let invalid = |reason: String| StoreError::InvalidTimestamp {
        column: source_column.to_string(),
        reason,
    };

    let index = batch
        .schema()
        .index_of(source_column)
        .map_err(|_| invalid("column not present in batch".to_string()))?;
    let dates = column_dates(batch.column(index)).map_err(invalid)?;

    let keys: ArrayRef = Arc::new(
        dates
            .into_iter()
            .map(|d| Some(partition_key(d, granularity)))
            .collect::<StringArray>(),
    );

    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    let key_field = Field::new(target_column, DataType::Utf8, false);

    match schema.index_of(target_column) {
        Ok(existing) => {
            fields[existing] = key_field;
            columns[existing] = keys;
        }
        Err(_) => {
            fields.push(key_field);
            columns.push(keys);
        }
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Calendar date (UTC) of every row, or the reason the column is unusable.
fn column_dates(column: &ArrayRef) -> std::result::Result<Vec<NaiveDate>, String> {
    let null_error = |row: usize| format!("null timestamp at row {}", row);

    match column.data_type() {
        DataType::Timestamp(_, _) => {
            let target = DataType::Timestamp(TimeUnit::Microsecond, Some(UTC.into()));
            let micros = cast(column, &target).map_err(|e| e.to_string())?;
            let micros = micros.as_primitive::<TimestampMicrosecondType>();
            (0..micros.len())
                .map(|row| {
                    if micros.is_null(row) {
                        return Err(null_error(row));
                    }
                    DateTime::from_timestamp_micros(micros.value(row))
                        .map(|ts| ts.date_naive())
                        .ok_or_else(|| format!("timestamp out of range at row {}", row))
                })
                .collect()
        }
        DataType::Date32 | DataType::Date64 => {
            let days = cast(column, &DataType::Date32).map_err(|e| e.to_string())?;
            let days = days.as_primitive::<arrow::datatypes::Date32Type>();
            (0..days.len())
                .map(|row| {
                    if days.is_null(row) {
                        return Err(null_error(row));
                    }
                    days_to_date(days.value(row))
                        .ok_or_else(|| format!("date out of range at row {}", row))
                })
                .collect()
        }
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            let text = cast(column, &DataType::Utf8).map_err(|e| e.to_string())?;
            let text = text.as_string::<i32>();
            (0..text.len())
                .map(|row| {
                    if text.is_null(row) {
                        return Err(null_error(row));
                    }
                    let raw = text.value(row);
                    parse_timestamp(raw)
                        .map(|ts| ts.date_naive())
                        .ok_or_else(|| format!("'{}' at row {} is not a timestamp", raw, row))
                })
                .collect()
        }
        other => Err(format!("column type {} is not a timestamp", other)),
    }
}

/// Ordered `(column, value)` pairs identifying one partition.
///
/// Values are the canonical partition text (see
/// [`Scalar::to_partition_string`]), unescaped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionValues(Vec<(String, String)>);

impl PartitionValues {
    pub fn new<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Typed value of `column` under `schema`.
    pub fn typed(&self, schema: &TableSchema, column: &str) -> Option<Scalar> {
        let raw = self.get(column)?;
        Scalar::parse_partition(raw, schema.field_type(column)?)
    }

    /// Directory path relative to the table root.
    pub fn relative_path(&self) -> PathBuf {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", k, escape_value(v)))
            .collect()
    }
}

impl fmt::Display for PartitionValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{}={}", k, escape_value(v)))
            .collect();
        write!(f, "{}", parts.join("/"))
    }
}

/// Bytes left as-is in partition directory names.
const PARTITION_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b':');

/// Percent-encode a partition value for use in a directory name.
pub fn escape_value(value: &str) -> String {
    utf8_percent_encode(value, PARTITION_VALUE).to_string()
}

/// Reverse [`escape_value`]. `None` for malformed escapes.
pub fn unescape_value(raw: &str) -> Option<String> {
    let well_formed = raw.split('%').skip(1).all(|rest| {
        rest.get(..2)
            .is_some_and(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
    });
    if !well_formed {
        return None;
    }
    percent_decode_str(raw).decode_utf8().ok().map(Cow::into_owned)
}

/// Partition values of `row` of a schema-coerced batch.
fn row_values(schema: &TableSchema, columns: &[(String, ArrayRef)], row: usize) -> Result<PartitionValues> {
    let mut pairs = Vec::with_capacity(columns.len());
    for (name, array) in columns {
        let ty = schema
            .field_type(name)
            .ok_or_else(|| StoreError::MissingPartitionColumn {
                column: name.clone(),
                row: None,
            })?;
        let value = Scalar::value_at(array.as_ref(), row, ty).ok_or_else(|| {
            StoreError::MissingPartitionColumn {
                column: name.clone(),
                row: Some(row),
            }
        })?;
        pairs.push((name.clone(), value.to_partition_string()));
    }
    Ok(PartitionValues(pairs))
}

/// Distinct partitions of a schema-coerced batch, with their row indices.
pub fn partition_rows(schema: &TableSchema, batch: &RecordBatch) -> Result<BTreeMap<PartitionValues, Vec<u32>>> {
    let columns: Vec<(String, ArrayRef)> = schema
        .partition_columns()
        .iter()
        .map(|name| {
            batch
                .column_by_name(name)
                .cloned()
                .map(|array| (name.clone(), array))
                .ok_or_else(|| StoreError::MissingPartitionColumn {
                    column: name.clone(),
                    row: None,
                })
        })
        .collect::<Result<_>>()?;

    let mut groups: BTreeMap<PartitionValues, Vec<u32>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        let values = row_values(schema, &columns, row)?;
        groups.entry(values).or_default().push(row as u32);
    }
    Ok(groups)
}

/// Split a schema-coerced batch into one batch per partition.
pub fn split_by_partition(
    schema: &TableSchema,
    batch: &RecordBatch,
) -> Result<Vec<(PartitionValues, RecordBatch)>> {
    if schema.partition_columns().is_empty() {
        if batch.num_rows() == 0 {
            return Ok(Vec::new());
        }
        return Ok(vec![(PartitionValues::default(), batch.clone())]);
    }

    partition_rows(schema, batch)?
        .into_iter()
        .map(|(values, rows)| {
            let indices = UInt32Array::from(rows);
            Ok((values, take_record_batch(batch, &indices)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::coerce_batch;
    use crate::schema::SchemaRegistry;
    use arrow::array::{Date32Array, Int64Array, TimestampMillisecondArray};
    use strata_common::{FieldSpec, FieldType};

    fn one_column(name: &str, array: ArrayRef) -> RecordBatch {
        let schema = Schema::new(vec![Field::new(name, array.data_type().clone(), true)]);
        RecordBatch::try_new(Arc::new(schema), vec![array]).unwrap()
    }

    fn keys(batch: &RecordBatch, column: &str) -> Vec<String> {
        batch
            .column_by_name(column)
            .unwrap()
            .as_string::<i32>()
            .iter()
            .map(|v| v.unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_month_and_day_granularity() {
        let batch = one_column(
            "ts",
            Arc::new(StringArray::from(vec!["2026-01-15T10:00:00Z"])),
        );

        let month = derive_partition_key(&batch, "ts", "date", Granularity::Month).unwrap();
        assert_eq!(keys(&month, "date"), ["2026-01-01"]);

        let day = derive_partition_key(&batch, "ts", "date", Granularity::Day).unwrap();
        assert_eq!(keys(&day, "date"), ["2026-01-15"]);
        assert_eq!(day.num_columns(), 2);
    }

    #[test]
    fn test_derive_from_timestamp_array() {
        // 2026-01-31T23:30:00Z in milliseconds
        let millis = 1_769_902_200_000;
        let batch = one_column(
            "ts",
            Arc::new(TimestampMillisecondArray::from(vec![millis]).with_timezone("UTC")),
        );
        let out = derive_partition_key(&batch, "ts", "month", Granularity::Month).unwrap();
        assert_eq!(keys(&out, "month"), ["2026-01-01"]);
    }

    #[test]
    fn test_derive_from_date_array() {
        let batch = one_column("d", Arc::new(Date32Array::from(vec![20_468])));
        let out = derive_partition_key(&batch, "d", "day", Granularity::Day).unwrap();
        assert_eq!(keys(&out, "day"), ["2026-01-15"]);
    }

    #[test]
    fn test_derive_replaces_existing_target() {
        let ts: ArrayRef = Arc::new(StringArray::from(vec!["2026-03-02"]));
        let stale: ArrayRef = Arc::new(StringArray::from(vec!["1999-01-01"]));
        let schema = Schema::new(vec![
            Field::new("ts", DataType::Utf8, true),
            Field::new("date", DataType::Utf8, true),
        ]);
        let batch = RecordBatch::try_new(Arc::new(schema), vec![ts, stale]).unwrap();

        let out = derive_partition_key(&batch, "ts", "date", Granularity::Month).unwrap();
        assert_eq!(out.num_columns(), 2);
        assert_eq!(keys(&out, "date"), ["2026-03-01"]);
    }

    #[test]
    fn test_whole_batch_rejected_on_bad_row() {
        let batch = one_column(
            "ts",
            Arc::new(StringArray::from(vec![Some("2026-01-15"), Some("soon")])),
        );
        let err = derive_partition_key(&batch, "ts", "date", Granularity::Day).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTimestamp { .. }));

        let batch = one_column("ts", Arc::new(StringArray::from(vec![None::<&str>])));
        assert!(derive_partition_key(&batch, "ts", "date", Granularity::Day).is_err());

        let batch = one_column("ts", Arc::new(Int64Array::from(vec![1])));
        assert!(derive_partition_key(&batch, "ts", "date", Granularity::Day).is_err());

        assert!(derive_partition_key(&batch, "missing", "date", Granularity::Day).is_err());
    }

    #[test]
    fn test_escape_round_trip() {
        for raw in ["plain", "a/b", "x=y", "50%", "space here", "ünï", ""] {
            let escaped = escape_value(raw);
            assert!(!escaped.contains('/'));
            assert!(!escaped.contains('='));
            assert_eq!(unescape_value(&escaped).as_deref(), Some(raw));
        }
        assert_eq!(escape_value("2026-01-01"), "2026-01-01");
        assert_eq!(unescape_value("%zz"), None);
        assert_eq!(unescape_value("%4"), None);
        assert_eq!(unescape_value("%FF"), None);
        assert_eq!(unescape_value("watch%2F2").as_deref(), Some("watch/2"));
    }

    #[test]
    fn test_relative_path_nesting() {
        let values = PartitionValues::new([("device", "watch/1"), ("date", "2026-01-01")]);
        assert_eq!(
            values.relative_path(),
            PathBuf::from("device=watch%2F1").join("date=2026-01-01")
        );
        assert_eq!(values.to_string(), "device=watch%2F1/date=2026-01-01");
    }

    #[test]
    fn test_split_by_partition() {
        let mut registry = SchemaRegistry::new();
        let schema = registry
            .register(
                "t",
                vec![
                    FieldSpec::required("id", FieldType::Integer),
                    FieldSpec::new("date", FieldType::String),
                ],
                &["date"],
                &["id"],
            )
            .unwrap();
        let input = RecordBatch::try_new(
            schema.arrow_schema().clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["2026-01-02", "2026-01-01", "2026-01-02"])),
            ],
        )
        .unwrap();
        let input = coerce_batch(&schema, &input).unwrap();

        let parts = split_by_partition(&schema, &input).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0.get("date"), Some("2026-01-01"));
        assert_eq!(parts[0].1.num_rows(), 1);
        assert_eq!(parts[1].0.get("date"), Some("2026-01-02"));
        assert_eq!(parts[1].1.num_rows(), 2);
    }
}
