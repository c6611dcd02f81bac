//! Semantic validation of a resolved configuration.
//!
//! Structural checks of table definitions (unknown columns, partition types)
//! belong to the store's schema registry; this only rejects settings that can
//! never produce a working store.

use std::collections::HashSet;

use crate::store_config::{CompressionCodec, StoreConfig};
use crate::ConfigError;

/// Valid zstd levels accepted by the Parquet writer.
const ZSTD_LEVELS: std::ops::RangeInclusive<i32> = 1..=22;

pub fn validate(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.root.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("root must not be empty".to_string()));
    }

    if config.max_row_group_size == 0 {
        return Err(ConfigError::Invalid(
            "max_row_group_size must be greater than zero".to_string(),
        ));
    }

    if let Some(level) = config.compression_level {
        if config.compression != CompressionCodec::Zstd {
            return Err(ConfigError::Invalid(format!(
                "compression_level only applies to zstd, codec is {}",
                config.compression
            )));
        }
        if !ZSTD_LEVELS.contains(&level) {
            return Err(ConfigError::Invalid(format!(
                "zstd level must be in [1, 22], got {}",
                level
            )));
        }
    }

    let mut seen = HashSet::new();
    for table in &config.tables {
        if !seen.insert(table.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "table '{}' declared more than once",
                table.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::{FieldSpec, FieldType, TableDefinition, TableName};

    fn table(name: &str) -> TableDefinition {
        TableDefinition::new(
            TableName::parse(name).unwrap(),
            vec![FieldSpec::new("id", FieldType::Integer)],
        )
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&StoreConfig::new("/data")).is_ok());
    }

    #[test]
    fn test_zero_row_group_rejected() {
        let mut config = StoreConfig::new("/data");
        config.max_row_group_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zstd_level_bounds() {
        let mut config = StoreConfig::new("/data");
        config.compression_level = Some(23);
        assert!(validate(&config).is_err());

        config.compression_level = Some(22);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_level_requires_zstd() {
        let mut config = StoreConfig::new("/data").with_compression(CompressionCodec::Snappy);
        config.compression_level = Some(3);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_tables_rejected() {
        let config = StoreConfig::new("/data")
            .with_table(table("a"))
            .with_table(table("a"));
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
