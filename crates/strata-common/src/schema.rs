//! Table definitions and on-disk format versioning.
//!
//! These types are the declarative form of a table: what ingestion jobs put in
//! configuration and what the store persists next to a table's partitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::id::TableName;

/// Current on-disk layout format version.
///
/// Follows semver: MAJOR.MINOR.PATCH
/// - MAJOR: Breaking changes (directory layout, partition value encoding)
/// - MINOR: Additive changes (new optional definition fields)
/// - PATCH: Bug fixes, documentation
pub const FORMAT_VERSION: &str = "1.0.0";

/// Check if a persisted format version is readable by this build.
pub fn is_compatible(version: &str) -> bool {
    let major = |v: &str| {
        v.split('.')
            .next()
            .and_then(|s| s.parse::<u32>().ok())
    };

    match (major(FORMAT_VERSION), major(version)) {
        (Some(current), Some(other)) => current == other,
        _ => false,
    }
}

/// Semantic type of a table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Float,
    String,
    Boolean,
    /// Instant in UTC, microsecond precision.
    Timestamp,
    /// Calendar date without time zone.
    Date,
}

impl FieldType {
    /// Whether values of this type can name a partition directory.
    pub fn is_partitionable(self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::String | FieldType::Boolean | FieldType::Date
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => write!(f, "integer"),
            FieldType::Float => write!(f, "float"),
            FieldType::String => write!(f, "string"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Timestamp => write!(f, "timestamp"),
            FieldType::Date => write!(f, "date"),
        }
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "integer" | "int" => Ok(FieldType::Integer),
            "float" | "double" => Ok(FieldType::Float),
            "string" | "str" => Ok(FieldType::String),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "timestamp" => Ok(FieldType::Timestamp),
            "date" => Ok(FieldType::Date),
            _ => Err(Error::UnknownFieldType(s.to_string())),
        }
    }
}

/// A named, typed column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl FieldSpec {
    /// Create a nullable field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
        }
    }

    /// Create a field that rejects nulls.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
        }
    }
}

/// Time bucket size for derived partition keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// `YYYY-MM-DD`
    Day,
    /// `YYYY-MM-01`
    Month,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Month => write!(f, "month"),
        }
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Granularity::Day),
            "month" | "monthly" => Ok(Granularity::Month),
            _ => Err(Error::UnknownGranularity(s.to_string())),
        }
    }
}

/// Derive a partition column from a timestamp column on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePartitioning {
    /// Column holding the record's timestamp.
    pub source_column: String,
    /// Partition column receiving the canonical key.
    pub target_column: String,
    pub granularity: Granularity,
}

/// Declarative definition of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: TableName,

    /// Ordered fields; the order is the on-disk column order.
    pub fields: Vec<FieldSpec>,

    /// Partition columns, outermost directory first.
    #[serde(default)]
    pub partition_columns: Vec<String>,

    /// Columns that identify a row within a partition.
    #[serde(default)]
    pub primary_key: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_partition: Option<TimePartitioning>,
}

impl TableDefinition {
    pub fn new(name: TableName, fields: Vec<FieldSpec>) -> Self {
        Self {
            name,
            fields,
            partition_columns: Vec::new(),
            primary_key: Vec::new(),
            time_partition: None,
        }
    }

    pub fn with_partition_columns<S: Into<String>>(
        mut self,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.partition_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_primary_key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_time_partition(mut self, time_partition: TimePartitioning) -> Self {
        self.time_partition = Some(time_partition);
        self
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Definition as persisted alongside a table's data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedDefinition {
    pub format_version: String,
    pub definition: TableDefinition,
}

impl PersistedDefinition {
    pub fn new(definition: TableDefinition) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            definition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_major_compatible() {
        assert!(is_compatible("1.0.0"));
        assert!(is_compatible("1.4.2"));
    }

    #[test]
    fn test_different_major_incompatible() {
        assert!(!is_compatible("0.9.0"));
        assert!(!is_compatible("2.0.0"));
        assert!(!is_compatible("garbage"));
    }

    #[test]
    fn test_granularity_parse() {
        assert_eq!("day".parse::<Granularity>().unwrap(), Granularity::Day);
        assert_eq!("Monthly".parse::<Granularity>().unwrap(), Granularity::Month);
        assert!("week".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_definition_json_shape() {
        let json = r#"{
            "name": "weights",
            "fields": [
                {"name": "id", "type": "integer", "nullable": false},
                {"name": "date", "type": "string"},
                {"name": "kg", "type": "float"}
            ],
            "partition_columns": ["date"],
            "primary_key": ["id"],
            "time_partition": {
                "source_column": "measured_at",
                "target_column": "date",
                "granularity": "month"
            }
        }"#;

        let def: TableDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.name.as_str(), "weights");
        assert_eq!(def.fields.len(), 3);
        assert!(!def.fields[0].nullable);
        assert!(def.fields[1].nullable);
        assert_eq!(def.field("kg").unwrap().field_type, FieldType::Float);
        assert_eq!(
            def.time_partition.as_ref().unwrap().granularity,
            Granularity::Month
        );
    }

    #[test]
    fn test_partitionable_types() {
        assert!(FieldType::Date.is_partitionable());
        assert!(FieldType::String.is_partitionable());
        assert!(!FieldType::Float.is_partitionable());
        assert!(!FieldType::Timestamp.is_partitionable());
    }
}
