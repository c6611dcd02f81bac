//! Strata configuration loading and validation.
//!
//! This crate provides:
//! - The typed [`StoreConfig`] handed to the store at construction
//! - Config resolution (explicit path → env → XDG → defaults)
//! - `STRATA_*` environment overrides
//! - Semantic validation

pub mod resolve;
pub mod store_config;
pub mod validate;

use std::path::PathBuf;
use thiserror::Error;

pub use resolve::{apply_env_overrides, load_file, parse_toml, resolve_config, ConfigPaths};
pub use store_config::{CompressionCodec, StoreConfig};
pub use validate::validate;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {source}")]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
