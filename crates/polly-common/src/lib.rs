//! Polly Common - Shared types and configuration
//!
//! This crate provides the volume and overlay types, identifier parsing and
//! configuration structures used by the metadata store, the reconciler and
//! the admin binary.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, LoggingConfig, ServiceConfig, StoreConfig};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
