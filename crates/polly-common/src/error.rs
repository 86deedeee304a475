//! Error types for configuration loading

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("illegal character in service name '{0}': '-' separates overlay ids")]
    IllegalServiceName(String),

    #[error("duplicate service name '{0}'")]
    DuplicateService(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
