//! Schema registry: typed, ordered field lists per table.
//!
//! A [`TableSchema`] is a validated [`TableDefinition`] plus its Arrow schema.
//! Field order fixes on-disk column order; partition column order fixes
//! directory nesting.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use strata_common::{FieldSpec, FieldType, TableDefinition, TableName};
use tracing::info;

use crate::error::{Result, StoreError};

/// Time zone attached to every timestamp column.
pub const UTC: &str = "UTC";

/// Arrow representation of a field type.
pub fn arrow_type(ty: FieldType) -> DataType {
    match ty {
        FieldType::Integer => DataType::Int64,
        FieldType::Float => DataType::Float64,
        FieldType::String => DataType::Utf8,
        FieldType::Boolean => DataType::Boolean,
        FieldType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some(UTC.into())),
        FieldType::Date => DataType::Date32,
    }
}

/// A registered, validated table schema.
#[derive(Debug, Clone)]
pub struct TableSchema {
    definition: TableDefinition,
    arrow: SchemaRef,
}

impl TableSchema {
    /// Validate a definition.
    ///
    /// Fails with `InvalidSchema` when partition or primary-key columns are not
    /// fields, names repeat, a partition column has a type that cannot name a
    /// directory, or the time partitioning is inconsistent.
    pub fn try_new(definition: TableDefinition) -> Result<Self> {
        let table = definition.name.as_str().to_string();
        let invalid = |reason: String| StoreError::invalid_schema(&table, reason);

        if definition.fields.is_empty() {
            return Err(invalid("table has no fields".to_string()));
        }

        let mut names = HashSet::new();
        for field in &definition.fields {
            if field.name.is_empty() {
                return Err(invalid("field name must not be empty".to_string()));
            }
            if !names.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
        }

        let mut seen = HashSet::new();
        for column in &definition.partition_columns {
            let field = definition
                .field(column)
                .ok_or_else(|| invalid(format!("partition column '{}' is not a field", column)))?;
            if !seen.insert(column.as_str()) {
                return Err(invalid(format!("partition column '{}' listed twice", column)));
            }
            if !field.field_type.is_partitionable() {
                return Err(invalid(format!(
                    "partition column '{}' has type {}; expected string, integer, boolean or date",
                    column, field.field_type
                )));
            }
            if column.contains(['/', '\\', '='])
                || column.starts_with('.')
                || column.starts_with('_')
            {
                return Err(invalid(format!(
                    "partition column name '{}' cannot be used as a directory name",
                    column
                )));
            }
        }

        let mut seen = HashSet::new();
        for column in &definition.primary_key {
            if definition.field(column).is_none() {
                return Err(invalid(format!("primary key column '{}' is not a field", column)));
            }
            if !seen.insert(column.as_str()) {
                return Err(invalid(format!("primary key column '{}' listed twice", column)));
            }
        }

        if let Some(tp) = &definition.time_partition {
            let source = definition.field(&tp.source_column).ok_or_else(|| {
                invalid(format!("time partition source '{}' is not a field", tp.source_column))
            })?;
            if !matches!(
                source.field_type,
                FieldType::Timestamp | FieldType::Date | FieldType::String
            ) {
                return Err(invalid(format!(
                    "time partition source '{}' has type {}; expected timestamp, date or string",
                    tp.source_column, source.field_type
                )));
            }
            let target = definition.field(&tp.target_column).ok_or_else(|| {
                invalid(format!("time partition target '{}' is not a field", tp.target_column))
            })?;
            if !definition.partition_columns.contains(&tp.target_column) {
                return Err(invalid(format!(
                    "time partition target '{}' is not a partition column",
                    tp.target_column
                )));
            }
            if !matches!(target.field_type, FieldType::String | FieldType::Date) {
                return Err(invalid(format!(
                    "time partition target '{}' must be a string or date field",
                    tp.target_column
                )));
            }
            if tp.source_column == tp.target_column {
                return Err(invalid(
                    "time partition source and target must differ".to_string(),
                ));
            }
        }

        let arrow = Arc::new(Schema::new(
            definition
                .fields
                .iter()
                .map(|f| Field::new(&f.name, arrow_type(f.field_type), f.nullable))
                .collect::<Vec<_>>(),
        ));

        Ok(Self { definition, arrow })
    }

    pub fn name(&self) -> &str {
        self.definition.name.as_str()
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.definition.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.definition.field(name)
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.field(name).map(|f| f.field_type)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.definition.fields.iter().position(|f| f.name == name)
    }

    pub fn partition_columns(&self) -> &[String] {
        &self.definition.partition_columns
    }

    pub fn primary_key(&self) -> &[String] {
        &self.definition.primary_key
    }

    pub fn is_partition_column(&self, name: &str) -> bool {
        self.definition.partition_columns.iter().any(|c| c == name)
    }

    pub fn is_primary_key(&self, name: &str) -> bool {
        self.definition.primary_key.iter().any(|c| c == name)
    }

    pub fn time_partition(&self) -> Option<&strata_common::TimePartitioning> {
        self.definition.time_partition.as_ref()
    }

    pub fn arrow_schema(&self) -> &SchemaRef {
        &self.arrow
    }
}

/// Named table schemas.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table from its parts.
    ///
    /// Re-registering a name replaces the previous schema; files already on
    /// disk are coerced to the new field list when read.
    pub fn register(
        &mut self,
        table_name: &str,
        fields: Vec<FieldSpec>,
        partition_columns: &[&str],
        primary_key: &[&str],
    ) -> Result<Arc<TableSchema>> {
        let name = TableName::parse(table_name)
            .map_err(|e| StoreError::invalid_schema(table_name, e.to_string()))?;
        let definition = TableDefinition::new(name, fields)
            .with_partition_columns(partition_columns.iter().copied())
            .with_primary_key(primary_key.iter().copied());
        self.register_definition(definition)
    }

    /// Register a table from a full definition.
    pub fn register_definition(&mut self, definition: TableDefinition) -> Result<Arc<TableSchema>> {
        let schema = Arc::new(TableSchema::try_new(definition)?);
        let name = schema.name().to_string();

        if self.tables.insert(name.clone(), Arc::clone(&schema)).is_some() {
            info!(table = %name, "table schema replaced");
        } else {
            info!(
                table = %name,
                fields = schema.fields().len(),
                partition_columns = ?schema.partition_columns(),
                primary_key = ?schema.primary_key(),
                "table registered"
            );
        }
        Ok(schema)
    }

    /// Look up a registered table.
    pub fn get(&self, table_name: &str) -> Result<Arc<TableSchema>> {
        self.tables
            .get(table_name)
            .cloned()
            .ok_or_else(|| StoreError::SchemaNotFound(table_name.to_string()))
    }

    pub fn contains(&self, table_name: &str) -> bool {
        self.tables.contains_key(table_name)
    }

    /// Registered table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::{Granularity, TimePartitioning};

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::required("id", FieldType::Integer),
            FieldSpec::new("ts", FieldType::Timestamp),
            FieldSpec::new("date", FieldType::String),
            FieldSpec::new("value", FieldType::Float),
        ]
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = SchemaRegistry::new();
        registry
            .register("readings", fields(), &["date"], &["id"])
            .unwrap();

        let schema = registry.get("readings").unwrap();
        assert_eq!(schema.partition_columns(), ["date".to_string()]);
        assert_eq!(schema.arrow_schema().fields().len(), 4);
        assert_eq!(schema.arrow_schema().field(0).name(), "id");
        assert!(!schema.arrow_schema().field(0).is_nullable());
        assert_eq!(schema.column_index("value"), Some(3));
    }

    #[test]
    fn test_get_unregistered() {
        let registry = SchemaRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(StoreError::SchemaNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_unknown_partition_column() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .register("readings", fields(), &["day"], &["id"])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema { .. }));
        assert!(!registry.contains("readings"));
    }

    #[test]
    fn test_unknown_primary_key_column() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .register("readings", fields(), &["date"], &["uuid"])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema { .. }));
    }

    #[test]
    fn test_float_partition_rejected() {
        let mut registry = SchemaRegistry::new();
        let err = registry
            .register("readings", fields(), &["value"], &["id"])
            .unwrap_err();
        assert!(err.to_string().contains("expected string"));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut registry = SchemaRegistry::new();
        let mut f = fields();
        f.push(FieldSpec::new("id", FieldType::String));
        assert!(registry.register("readings", f, &[], &[]).is_err());
    }

    #[test]
    fn test_bad_table_name() {
        let mut registry = SchemaRegistry::new();
        let err = registry.register("../x", fields(), &[], &[]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema { .. }));
    }

    #[test]
    fn test_time_partition_validation() {
        let name = TableName::parse("readings").unwrap();
        let good = TableDefinition::new(name.clone(), fields())
            .with_partition_columns(["date"])
            .with_primary_key(["id"])
            .with_time_partition(TimePartitioning {
                source_column: "ts".into(),
                target_column: "date".into(),
                granularity: Granularity::Month,
            });
        assert!(TableSchema::try_new(good).is_ok());

        let not_partition = TableDefinition::new(name, fields())
            .with_primary_key(["id"])
            .with_time_partition(TimePartitioning {
                source_column: "ts".into(),
                target_column: "date".into(),
                granularity: Granularity::Day,
            });
        assert!(TableSchema::try_new(not_partition).is_err());
    }

    #[test]
    fn test_timestamp_arrow_type_is_utc_micros() {
        assert_eq!(
            arrow_type(FieldType::Timestamp),
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        );
    }
}
