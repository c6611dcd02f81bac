//! Single typed values: filter literals and partition values.
//!
//! A [`Scalar`] always carries the semantic type of the field it belongs to,
//! so comparisons never mix types and partition directory names round-trip.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{Date32Type, Float64Type, Int64Type, TimestampMicrosecondType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use strata_common::FieldType;

use crate::schema::UTC;

/// A non-null value of one of the supported field types.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    /// Microseconds since the Unix epoch, UTC.
    Timestamp(i64),
    /// Days since the Unix epoch.
    Date(i32),
}

impl Scalar {
    pub fn field_type(&self) -> FieldType {
        match self {
            Scalar::Integer(_) => FieldType::Integer,
            Scalar::Float(_) => FieldType::Float,
            Scalar::String(_) => FieldType::String,
            Scalar::Boolean(_) => FieldType::Boolean,
            Scalar::Timestamp(_) => FieldType::Timestamp,
            Scalar::Date(_) => FieldType::Date,
        }
    }

    /// Convert a JSON literal into a value of type `ty`.
    ///
    /// Returns a description of the mismatch on failure.
    pub fn from_json(value: &Value, ty: FieldType) -> Result<Self, String> {
        let mismatch = || format!("value {} is not a valid {}", value, ty);

        match (ty, value) {
            (_, Value::Null) => Err("null is not a comparable value".to_string()),
            (FieldType::Integer, Value::Number(n)) => {
                n.as_i64().map(Scalar::Integer).ok_or_else(mismatch)
            }
            (FieldType::Float, Value::Number(n)) => {
                n.as_f64().map(Scalar::Float).ok_or_else(mismatch)
            }
            (FieldType::String, Value::String(s)) => Ok(Scalar::String(s.clone())),
            (FieldType::Boolean, Value::Bool(b)) => Ok(Scalar::Boolean(*b)),
            (FieldType::Timestamp, Value::String(s)) => parse_timestamp(s)
                .map(|ts| Scalar::Timestamp(ts.timestamp_micros()))
                .ok_or_else(mismatch),
            (FieldType::Date, Value::String(s)) => parse_date(s)
                .map(|d| Scalar::Date(date_to_days(d)))
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        }
    }

    /// JSON literal that [`Scalar::from_json`] maps back to this value.
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Integer(v) => Value::from(*v),
            Scalar::Float(v) => Value::from(*v),
            Scalar::Boolean(v) => Value::from(*v),
            Scalar::String(_) | Scalar::Timestamp(_) | Scalar::Date(_) => {
                Value::from(self.to_partition_string())
            }
        }
    }

    /// Parse a partition directory value back into a typed value.
    pub fn parse_partition(raw: &str, ty: FieldType) -> Option<Self> {
        match ty {
            FieldType::Integer => raw.parse().ok().map(Scalar::Integer),
            FieldType::String => Some(Scalar::String(raw.to_string())),
            FieldType::Boolean => raw.parse().ok().map(Scalar::Boolean),
            FieldType::Date => parse_date(raw).map(|d| Scalar::Date(date_to_days(d))),
            FieldType::Float | FieldType::Timestamp => None,
        }
    }

    /// Canonical text used in partition directory names.
    pub fn to_partition_string(&self) -> String {
        match self {
            Scalar::Integer(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::String(v) => v.clone(),
            Scalar::Boolean(v) => v.to_string(),
            Scalar::Timestamp(v) => DateTime::from_timestamp_micros(*v)
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_else(|| v.to_string()),
            Scalar::Date(v) => days_to_date(*v)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| v.to_string()),
        }
    }

    /// One-element array with the field type's Arrow representation.
    pub fn to_array(&self) -> ArrayRef {
        match self {
            Scalar::Integer(v) => Arc::new(Int64Array::from(vec![*v])),
            Scalar::Float(v) => Arc::new(Float64Array::from(vec![*v])),
            Scalar::String(v) => Arc::new(StringArray::from(vec![v.as_str()])),
            Scalar::Boolean(v) => Arc::new(BooleanArray::from(vec![*v])),
            Scalar::Timestamp(v) => {
                Arc::new(TimestampMicrosecondArray::from(vec![*v]).with_timezone(UTC))
            }
            Scalar::Date(v) => Arc::new(Date32Array::from(vec![*v])),
        }
    }

    /// Read row `row` of a schema-typed column. `None` for nulls.
    pub fn value_at(array: &dyn Array, row: usize, ty: FieldType) -> Option<Self> {
        if array.is_null(row) {
            return None;
        }
        match ty {
            FieldType::Integer => array
                .as_primitive_opt::<Int64Type>()
                .map(|a| Scalar::Integer(a.value(row))),
            FieldType::Float => array
                .as_primitive_opt::<Float64Type>()
                .map(|a| Scalar::Float(a.value(row))),
            FieldType::String => array
                .as_string_opt::<i32>()
                .map(|a| Scalar::String(a.value(row).to_string())),
            FieldType::Boolean => array
                .as_boolean_opt()
                .map(|a| Scalar::Boolean(a.value(row))),
            FieldType::Timestamp => array
                .as_primitive_opt::<TimestampMicrosecondType>()
                .map(|a| Scalar::Timestamp(a.value(row))),
            FieldType::Date => array
                .as_primitive_opt::<Date32Type>()
                .map(|a| Scalar::Date(a.value(row))),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Integer(a), Scalar::Integer(b)) => a.partial_cmp(b),
            (Scalar::Float(a), Scalar::Float(b)) => a.partial_cmp(b),
            (Scalar::String(a), Scalar::String(b)) => a.partial_cmp(b),
            (Scalar::Boolean(a), Scalar::Boolean(b)) => a.partial_cmp(b),
            (Scalar::Timestamp(a), Scalar::Timestamp(b)) => a.partial_cmp(b),
            (Scalar::Date(a), Scalar::Date(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_partition_string())
    }
}

/// Parse the timestamp text forms accepted from ingestion sources.
///
/// Naive date-times are taken as UTC; a bare date is midnight UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    parse_date(s)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn epoch() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

pub fn date_to_days(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    epoch().checked_add_signed(chrono::Duration::days(days as i64))
}
