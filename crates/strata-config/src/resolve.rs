//! Configuration resolution: defaults → TOML file → environment.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::store_config::{CompressionCodec, StoreConfig};
use crate::validate::validate;
use crate::ConfigError;

/// Environment variable naming an explicit config file.
pub const ENV_CONFIG_FILE: &str = "STRATA_CONFIG";

const CONFIG_DIR_NAME: &str = "strata";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Where to look for a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Explicit path; must exist when set.
    pub config_file: Option<PathBuf>,
}

impl ConfigPaths {
    /// Use an explicit configuration file.
    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        Self {
            config_file: Some(path.into()),
        }
    }

    /// Discover the config file from `STRATA_CONFIG` or the platform config dir.
    ///
    /// A discovered platform file that does not exist is simply skipped.
    pub fn discover() -> Self {
        if let Ok(path) = std::env::var(ENV_CONFIG_FILE) {
            return Self::explicit(path);
        }

        let candidate = dirs::config_dir()
            .map(|base| base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .filter(|path| path.exists());

        Self {
            config_file: candidate,
        }
    }
}

/// Resolve the full configuration and validate it.
pub fn resolve_config(paths: &ConfigPaths) -> Result<StoreConfig, ConfigError> {
    let mut config = match &paths.config_file {
        Some(path) => load_file(path)?,
        None => {
            debug!("no config file found, using defaults");
            StoreConfig::default()
        }
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;

    info!(
        root = %config.root.display(),
        compression = %config.compression,
        tables = config.tables.len(),
        "configuration resolved"
    );
    Ok(config)
}

/// Parse a TOML configuration file. Missing keys take their defaults.
pub fn load_file(path: &Path) -> Result<StoreConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_toml(&content).map_err(|e| match e {
        ConfigError::Parse { source, .. } => ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        },
        other => other,
    })
}

/// Parse configuration from a TOML string.
pub fn parse_toml(content: &str) -> Result<StoreConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: None,
        source: e,
    })
}

/// Apply `STRATA_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut StoreConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(root) = lookup("STRATA_ROOT") {
        config.root = PathBuf::from(root);
    }

    if let Some(codec) = lookup("STRATA_COMPRESSION") {
        config.compression = codec
            .parse::<CompressionCodec>()
            .map_err(|reason| ConfigError::InvalidEnv {
                var: "STRATA_COMPRESSION".to_string(),
                reason,
            })?;
    }

    if let Some(level) = lookup("STRATA_COMPRESSION_LEVEL") {
        let level = level.trim().parse::<i32>().map_err(|e| ConfigError::InvalidEnv {
            var: "STRATA_COMPRESSION_LEVEL".to_string(),
            reason: e.to_string(),
        })?;
        config.compression_level = Some(level);
    }

    if let Some(size) = lookup("STRATA_MAX_ROW_GROUP_SIZE") {
        config.max_row_group_size =
            size.trim().parse::<usize>().map_err(|e| ConfigError::InvalidEnv {
                var: "STRATA_MAX_ROW_GROUP_SIZE".to_string(),
                reason: e.to_string(),
            })?;
    }

    if let Some(format) = lookup("STRATA_LOG_FORMAT") {
        config.logging.format = format.parse().map_err(|e: strata_common::Error| {
            ConfigError::InvalidEnv {
                var: "STRATA_LOG_FORMAT".to_string(),
                reason: e.to_string(),
            }
        })?;
    }

    Ok(())
}
