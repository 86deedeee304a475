//! Configuration types for Polly
//!
//! Configuration is read from a TOML file. Every section has defaults, so an
//! empty or missing file yields a working single-node setup backed by an
//! embedded redb database.

use crate::error::{ConfigError, ConfigResult};
use crate::types::OVERLAY_ID_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Root configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Metadata store configuration
    pub store: StoreConfig,
    /// External volume services
    pub services: Vec<ServiceConfig>,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse configuration from a TOML string and validate it
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check service names; `-` is reserved as the overlay id separator
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.is_empty() {
                return Err(ConfigError::Invalid("service name must not be empty".into()));
            }
            if service.name.contains(OVERLAY_ID_SEPARATOR) {
                return Err(ConfigError::IllegalServiceName(service.name.clone()));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::DuplicateService(service.name.clone()));
            }
        }
        if self.store.connection_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "store.connection_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Metadata store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend kind (`redb`, `boltdb`, `memory`)
    pub backend: String,
    /// Backend endpoints; the embedded backend uses the first as a file path
    pub endpoints: Vec<String>,
    /// Bucket (table) name for embedded backends
    pub bucket: String,
    /// Root path segment for every key
    pub root: String,
    /// Upper bound on opening the backend
    pub connection_timeout_ms: u64,
    /// Mirror live provider fields into the store
    pub persist_fields: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "redb".to_string(),
            endpoints: vec!["/var/lib/polly/polly.redb".to_string()],
            bucket: "polly".to_string(),
            root: "polly".to_string(),
            connection_timeout_ms: 10_000,
            persist_fields: false,
        }
    }
}

impl StoreConfig {
    /// In-memory store, used by tests and dry runs
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: "memory".to_string(),
            endpoints: Vec::new(),
            ..Self::default()
        }
    }
}

/// External volume service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, used as the overlay id prefix
    pub name: String,
    /// Provider driver (`mock`)
    #[serde(default = "default_driver")]
    pub driver: String,
}

fn default_driver() -> String {
    "mock".to_string()
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.backend, "redb");
        assert_eq!(config.store.root, "polly");
        assert_eq!(config.store.connection_timeout_ms, 10_000);
        assert!(!config.store.persist_fields);
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml_str(
            r#"
            [store]
            backend = "memory"
            root = "overlay/prod"

            [[services]]
            name = "mock"

            [[services]]
            name = "ebs"
            driver = "mock"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.store.root, "overlay/prod");
        assert_eq!(config.store.bucket, "polly");
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].driver, "mock");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_service_name_with_separator_rejected() {
        let err = Config::from_toml_str(
            r#"
            [[services]]
            name = "mock-a"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::IllegalServiceName(_)));
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let err = Config::from_toml_str(
            r#"
            [[services]]
            name = "mock"
            [[services]]
            name = "mock"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateService(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/polly.toml").unwrap();
        assert_eq!(config.store.bucket, "polly");
    }
}
