//! Storage configuration types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use strata_common::{LoggingConfig, TableDefinition};

/// Default maximum rows per Parquet row group.
pub const DEFAULT_MAX_ROW_GROUP_SIZE: usize = 128 * 1024;

/// Default zstd compression level.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

const ENV_DATA_DIR: &str = "STRATA_DATA";
const DIR_NAME: &str = "strata";

/// Compression codec for Parquet data pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionCodec {
    #[default]
    Zstd,
    Snappy,
    #[serde(rename = "none")]
    Uncompressed,
}

impl fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionCodec::Zstd => write!(f, "zstd"),
            CompressionCodec::Snappy => write!(f, "snappy"),
            CompressionCodec::Uncompressed => write!(f, "none"),
        }
    }
}

impl FromStr for CompressionCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zstd" => Ok(CompressionCodec::Zstd),
            "snappy" | "snap" => Ok(CompressionCodec::Snappy),
            "none" | "uncompressed" => Ok(CompressionCodec::Uncompressed),
            other => Err(format!("unknown compression codec '{}'", other)),
        }
    }
}

/// Complete storage configuration.
///
/// Built once at process start (see [`crate::resolve_config`]) and handed to
/// the store's constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one subdirectory per table.
    pub root: PathBuf,

    pub compression: CompressionCodec,

    /// zstd level; ignored for other codecs when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<i32>,

    pub max_row_group_size: usize,

    pub logging: LoggingConfig,

    /// Tables declared up front by ingestion jobs.
    #[serde(rename = "table")]
    pub tables: Vec<TableDefinition>,
}

impl StoreConfig {
    /// Config rooted at `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_compression(mut self, codec: CompressionCodec) -> Self {
        self.compression = codec;
        self
    }

    pub fn with_table(mut self, definition: TableDefinition) -> Self {
        self.tables.push(definition);
        self
    }

    /// Effective zstd level.
    pub fn zstd_level(&self) -> i32 {
        self.compression_level.unwrap_or(DEFAULT_ZSTD_LEVEL)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            compression: CompressionCodec::default(),
            compression_level: None,
            max_row_group_size: DEFAULT_MAX_ROW_GROUP_SIZE,
            logging: LoggingConfig::default(),
            tables: Vec::new(),
        }
    }
}

/// Resolve the default data root.
fn default_root() -> PathBuf {
    // 1) Explicit override
    if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
        return PathBuf::from(dir);
    }

    // 2) XDG_DATA_HOME
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join(DIR_NAME);
    }

    // 3) Platform default
    if let Some(base) = dirs::data_dir() {
        return base.join(DIR_NAME);
    }

    PathBuf::from(DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_parse_and_display() {
        assert_eq!("ZSTD".parse::<CompressionCodec>().unwrap(), CompressionCodec::Zstd);
        assert_eq!("snap".parse::<CompressionCodec>().unwrap(), CompressionCodec::Snappy);
        assert_eq!(
            "none".parse::<CompressionCodec>().unwrap(),
            CompressionCodec::Uncompressed
        );
        assert!("lz5".parse::<CompressionCodec>().is_err());
        assert_eq!(CompressionCodec::Uncompressed.to_string(), "none");
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("/tmp/strata");
        assert_eq!(config.root, PathBuf::from("/tmp/strata"));
        assert_eq!(config.compression, CompressionCodec::Zstd);
        assert_eq!(config.zstd_level(), DEFAULT_ZSTD_LEVEL);
        assert_eq!(config.max_row_group_size, DEFAULT_MAX_ROW_GROUP_SIZE);
        assert!(config.tables.is_empty());
    }
}
