//! On-disk layout of tables.
//!
//! ```text
//! <root>/<table>/_table.json
//! <root>/<table>/<col1>=<v1>/<col2>=<v2>/part-<uuid>.parquet
//! ```
//!
//! Entries starting with `.` or `_` are never data. In-flight writes use
//! hidden `.staged-<uuid>.parquet` names inside the partition directory, and
//! definition updates stage through `.table-<uuid>.json.tmp`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use strata_common::schema::is_compatible;
use strata_common::{PersistedDefinition, TableDefinition, FORMAT_VERSION};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::partition::{unescape_value, PartitionValues};
use crate::schema::TableSchema;

/// Persisted table definition file name.
pub const DEFINITION_FILE: &str = "_table.json";

const DATA_EXTENSION: &str = "parquet";
const STAGING_PREFIX: &str = ".staged-";
const DEFINITION_STAGING_PREFIX: &str = ".table-";

/// One partition directory and its data files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub values: PartitionValues,
    pub path: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Path arithmetic and directory metadata for every table under a root.
#[derive(Debug, Clone)]
pub struct TableLayout {
    root: PathBuf,
}

impl TableLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    pub fn partition_dir(&self, table: &str, values: &PartitionValues) -> PathBuf {
        self.table_dir(table).join(values.relative_path())
    }

    /// A table exists once its directory has been created by a write.
    pub fn table_exists(&self, table: &str) -> bool {
        self.table_dir(table).is_dir()
    }

    pub fn definition_path(&self, table: &str) -> PathBuf {
        self.table_dir(table).join(DEFINITION_FILE)
    }

    /// Load `_table.json` for `table`, if present.
    pub fn read_definition(&self, table: &str) -> Result<Option<TableDefinition>> {
        let path = self.definition_path(table);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let persisted: PersistedDefinition = serde_json::from_str(&content)?;
        if !is_compatible(&persisted.format_version) {
            return Err(StoreError::invalid_schema(
                table,
                format!(
                    "table written with format {}, this build reads {}",
                    persisted.format_version, FORMAT_VERSION
                ),
            ));
        }
        Ok(Some(persisted.definition))
    }

    /// Record `definition` atomically in the table directory.
    pub fn write_definition(&self, definition: &TableDefinition) -> Result<()> {
        let table = definition.name.as_str();
        let dir = self.table_dir(table);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let json = serde_json::to_vec_pretty(&PersistedDefinition::new(definition.clone()))?;
        let path = self.definition_path(table);
        // Concurrent writers each stage under their own name; the last rename wins.
        let tmp_path = dir.join(format!("{}{}.json.tmp", DEFINITION_STAGING_PREFIX, Uuid::new_v4()));

        let staged = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)
            .and_then(|mut file| file.write_all(&json).and_then(|_| file.flush()))
            .map_err(|e| StoreError::io(&tmp_path, e))
            .and_then(|_| fs::rename(&tmp_path, &path).map_err(|e| StoreError::io(&path, e)));
        if let Err(e) = staged {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %tmp_path.display(), error = %cleanup, "failed to remove staged definition");
                }
            }
            return Err(e);
        }
        debug!(table, path = %path.display(), "table definition persisted");
        Ok(())
    }

    /// Tables under the root that carry a persisted definition.
    pub fn persisted_tables(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };

        let mut tables = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_hidden(&name) {
                continue;
            }
            if entry.path().join(DEFINITION_FILE).is_file() {
                tables.push(name);
            }
        }
        tables.sort();
        Ok(tables)
    }

    /// Every partition of `schema`'s table that holds at least one data file.
    pub fn list_partitions(&self, schema: &TableSchema) -> Result<Vec<PartitionInfo>> {
        let table_dir = self.table_dir(schema.name());
        if !table_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        walk(
            &table_dir,
            schema.partition_columns(),
            Vec::new(),
            &mut found,
        )?;
        Ok(found)
    }

    /// Open one partition directly, without listing its siblings.
    pub fn partition(&self, table: &str, values: &PartitionValues) -> Result<Option<PartitionInfo>> {
        let path = self.partition_dir(table, values);
        let files = data_files(&path)?;
        if files.is_empty() {
            return Ok(None);
        }
        Ok(Some(PartitionInfo {
            values: values.clone(),
            path,
            files,
        }))
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// Descend one `column=value` level per remaining partition column.
fn walk(
    dir: &Path,
    columns: &[String],
    prefix: Vec<(String, String)>,
    found: &mut Vec<PartitionInfo>,
) -> Result<()> {
    let Some((column, rest)) = columns.split_first() else {
        let files = data_files(dir)?;
        if !files.is_empty() {
            found.push(PartitionInfo {
                values: PartitionValues::new(prefix),
                path: dir.to_path_buf(),
                files,
            });
        }
        return Ok(());
    };

    let mut entries = fs::read_dir(dir)
        .map_err(|e| StoreError::io(dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| StoreError::io(dir, e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %path.display(), "skipping non-UTF-8 directory entry");
            continue;
        };
        if is_hidden(&name) {
            continue;
        }
        if !path.is_dir() {
            warn!(path = %path.display(), "skipping file outside a partition directory");
            continue;
        }
        let value = name
            .split_once('=')
            .filter(|(key, _)| key == column)
            .and_then(|(_, raw)| unescape_value(raw));
        let Some(value) = value else {
            warn!(
                path = %path.display(),
                expected = %column,
                "skipping directory that is not a partition of this table"
            );
            continue;
        };

        let mut values = prefix.clone();
        values.push((column.clone(), value));
        walk(&path, rest, values, found)?;
    }
    Ok(())
}

/// Visible Parquet files directly inside `dir`, sorted by name.
///
/// A missing directory has no files.
pub fn data_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(STAGING_PREFIX) {
            warn!(path = %path.display(), "ignoring leftover staging file from an interrupted write");
            continue;
        }
        if is_hidden(&name) || !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) == Some(DATA_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Hidden name for a file being written into `dir`.
pub fn staging_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}{}.{}", STAGING_PREFIX, Uuid::new_v4(), DATA_EXTENSION))
}

/// Final name for a new data file in `dir`.
pub fn data_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("part-{}.{}", Uuid::new_v4(), DATA_EXTENSION))
}
