//! The table store: one root directory, its registered tables, and the
//! read/write/upsert entry points ingestion jobs call.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use parquet::file::properties::WriterProperties;
use strata_common::{FieldSpec, TableDefinition};
use strata_config::StoreConfig;
use tracing::{info, warn};

use crate::error::Result;
use crate::layout::{PartitionInfo, TableLayout};
use crate::partition::derive_partition_key;
use crate::predicate::{FilterSpec, Predicate};
use crate::reader::DatasetReader;
use crate::schema::{SchemaRegistry, TableSchema};
use crate::stats::IoStats;
use crate::upsert::{check_keys, UpsertCoordinator, UpsertSummary};
use crate::writer::{writer_properties, DatasetWriter, WriteMode, WriteSummary};

/// Partitioned Parquet tables under one root.
///
/// Reads take `&self` and may run concurrently. Writers to the same table are
/// not serialized; callers that run several ingestion jobs against one table
/// must order them.
#[derive(Debug)]
pub struct TableStore {
    config: StoreConfig,
    layout: TableLayout,
    registry: SchemaRegistry,
    properties: WriterProperties,
    stats: IoStats,
}

impl TableStore {
    /// Open the store described by `config`.
    ///
    /// Tables declared in the config are registered first; tables found on
    /// disk with a persisted definition are registered when the config does
    /// not declare them.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let layout = TableLayout::new(&config.root);
        let properties = writer_properties(&config)?;

        let mut registry = SchemaRegistry::new();
        for definition in &config.tables {
            registry.register_definition(definition.clone())?;
        }

        for table in layout.persisted_tables()? {
            if registry.contains(&table) {
                continue;
            }
            match layout.read_definition(&table)? {
                Some(definition) if definition.name.as_str() == table => {
                    registry.register_definition(definition)?;
                }
                Some(definition) => warn!(
                    directory = %table,
                    declared = %definition.name,
                    "table definition name does not match its directory; ignored"
                ),
                None => {}
            }
        }

        info!(
            root = %config.root.display(),
            tables = registry.table_names().len(),
            compression = %config.compression,
            "table store opened"
        );

        Ok(Self {
            config,
            layout,
            registry,
            properties,
            stats: IoStats::new(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn stats(&self) -> &IoStats {
        &self.stats
    }

    // ── Schema registry ─────────────────────────────────────────────────

    /// Register (or replace) a table schema.
    pub fn register(
        &mut self,
        table: &str,
        fields: Vec<FieldSpec>,
        partition_columns: &[&str],
        primary_key: &[&str],
    ) -> Result<Arc<TableSchema>> {
        self.registry
            .register(table, fields, partition_columns, primary_key)
    }

    pub fn register_definition(&mut self, definition: TableDefinition) -> Result<Arc<TableSchema>> {
        self.registry.register_definition(definition)
    }

    pub fn schema(&self, table: &str) -> Result<Arc<TableSchema>> {
        self.registry.get(table)
    }

    /// Registered table names, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.registry.table_names()
    }

    /// Whether a registered table has been created by a write.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let schema = self.registry.get(table)?;
        Ok(self.layout.table_exists(schema.name()))
    }

    pub fn list_partitions(&self, table: &str) -> Result<Vec<PartitionInfo>> {
        let schema = self.registry.get(table)?;
        let partitions = self.layout.list_partitions(&schema)?;
        self.stats.record_listed(partitions.len());
        Ok(partitions)
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// Compile `filter` against `table`'s schema.
    pub fn compile(&self, table: &str, filter: &FilterSpec) -> Result<Predicate> {
        let schema = self.registry.get(table)?;
        Predicate::compile(filter, &schema)
    }

    /// Read rows of `table`, optionally filtered and projected.
    pub fn read(
        &self,
        table: &str,
        filter: Option<&FilterSpec>,
        columns: Option<&[&str]>,
    ) -> Result<RecordBatch> {
        let schema = self.registry.get(table)?;
        let predicate = filter
            .map(|filter| Predicate::compile(filter, &schema))
            .transpose()?;
        self.reader().read(&schema, predicate.as_ref(), columns)
    }

    /// Read with an already compiled predicate.
    pub fn read_predicate(
        &self,
        table: &str,
        predicate: Option<&Predicate>,
        columns: Option<&[&str]>,
    ) -> Result<RecordBatch> {
        let schema = self.registry.get(table)?;
        self.reader().read(&schema, predicate, columns)
    }

    // ── Writes ──────────────────────────────────────────────────────────

    pub fn write(&self, table: &str, batch: &RecordBatch, mode: WriteMode) -> Result<WriteSummary> {
        let schema = self.registry.get(table)?;
        let batch = derive_time_partition(&schema, batch)?;
        self.writer().write(&schema, &batch, mode)
    }

    /// Upsert keyed by the table's registered primary key.
    pub fn upsert(&self, table: &str, batch: &RecordBatch) -> Result<UpsertSummary> {
        let schema = self.registry.get(table)?;
        let primary_key = schema.primary_key().to_vec();
        self.run_upsert(&schema, batch, &primary_key)
    }

    /// Upsert with caller-declared keys.
    ///
    /// `partition_columns` must match the table's layout; `primary_key` may
    /// name any schema fields.
    pub fn upsert_with_keys(
        &self,
        table: &str,
        batch: &RecordBatch,
        primary_key: &[&str],
        partition_columns: &[&str],
    ) -> Result<UpsertSummary> {
        let schema = self.registry.get(table)?;
        let primary_key: Vec<String> = primary_key.iter().map(|c| c.to_string()).collect();
        let partition_columns: Vec<String> =
            partition_columns.iter().map(|c| c.to_string()).collect();
        check_keys(&schema, &primary_key, &partition_columns)?;
        self.run_upsert(&schema, batch, &primary_key)
    }

    fn run_upsert(
        &self,
        schema: &TableSchema,
        batch: &RecordBatch,
        primary_key: &[String],
    ) -> Result<UpsertSummary> {
        check_keys(schema, primary_key, schema.partition_columns())?;
        let batch = derive_time_partition(schema, batch)?;
        let writer = self.writer();
        UpsertCoordinator::new(&self.layout, self.reader(), &writer).upsert(
            schema,
            &batch,
            primary_key,
        )
    }

    fn reader(&self) -> DatasetReader<'_> {
        DatasetReader::new(&self.layout, &self.stats)
    }

    fn writer(&self) -> DatasetWriter<'_> {
        DatasetWriter::new(&self.layout, &self.stats, self.properties.clone())
    }
}

/// Fill the table's derived partition column, when it declares one.
fn derive_time_partition<'b>(schema: &TableSchema, batch: &'b RecordBatch) -> Result<Cow<'b, RecordBatch>> {
    match schema.time_partition() {
        Some(tp) if batch.num_rows() > 0 => Ok(Cow::Owned(derive_partition_key(
            batch,
            &tp.source_column,
            &tp.target_column,
            tp.granularity,
        )?)),
        _ => Ok(Cow::Borrowed(batch)),
    }
}
