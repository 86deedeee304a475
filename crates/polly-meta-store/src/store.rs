//! Overlay store handle.
//!
//! Wraps a [`KvBackend`] with the key schema and typed error context. Every
//! call is a blocking pass-through to the backend with no caching and no
//! retry; failures carry the operation and the key involved.

use crate::backend::{BackendKind, KvBackend, KvPair, MemoryBackend, RedbBackend};
use crate::error::{MetaStoreError, MetaStoreResult};
use crate::keys::{Category, KeySchema};
use polly_common::StoreConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Schema version written by this build
pub const STORE_VERSION: &str = "v0.1.0";

/// Persistent overlay store
pub struct MetaStore {
    backend: Box<dyn KvBackend>,
    schema: KeySchema,
    persist_fields: bool,
}

impl MetaStore {
    /// Open the backend named in `config` and initialize the key layout.
    pub fn open(config: &StoreConfig) -> MetaStoreResult<Self> {
        let kind: BackendKind = config
            .backend
            .parse()
            .map_err(|_| MetaStoreError::UnsupportedBackend(config.backend.clone()))?;

        let backend: Box<dyn KvBackend> = match kind {
            BackendKind::Redb => {
                let path = config.endpoints.first().ok_or_else(|| {
                    MetaStoreError::Config("redb backend requires an endpoint path".to_string())
                })?;
                let timeout = Duration::from_millis(config.connection_timeout_ms);
                let backend = RedbBackend::open(path, &config.bucket, timeout)
                    .map_err(|e| MetaStoreError::backend("open", path, e))?;
                Box::new(backend)
            }
            BackendKind::Memory => Box::new(MemoryBackend::new()),
        };

        Self::with_backend(backend, config)
    }

    /// Wrap an already opened backend
    pub fn with_backend(backend: Box<dyn KvBackend>, config: &StoreConfig) -> MetaStoreResult<Self> {
        let store = Self {
            backend,
            schema: KeySchema::new(&config.root),
            persist_fields: config.persist_fields,
        };
        store.init()?;
        Ok(store)
    }

    /// Fresh in-memory store with default settings
    pub fn in_memory() -> MetaStoreResult<Self> {
        Self::with_backend(Box::new(MemoryBackend::new()), &StoreConfig::memory())
    }

    /// Idempotent: root marker, version marker and one root per category
    fn init(&self) -> MetaStoreResult<()> {
        self.put(&self.schema.root_marker(), b"")?;

        let version_key = self.schema.version_key();
        match self.backend.get(&version_key) {
            Ok(found) => {
                let found = String::from_utf8_lossy(&found);
                if found != STORE_VERSION {
                    warn!(
                        "Store schema version is {}, this build writes {}",
                        found, STORE_VERSION
                    );
                }
            }
            Err(e) if e.is_not_found() => {
                self.put(&version_key, STORE_VERSION.as_bytes())?;
            }
            Err(e) => return Err(MetaStoreError::backend("get", version_key, e)),
        }

        for category in Category::ALL {
            self.put(&self.schema.root_key(category), b"")?;
        }

        info!(
            "Initialized {} overlay store at root '{}'",
            self.backend.name(),
            self.schema.root_marker()
        );
        Ok(())
    }

    #[must_use]
    pub const fn schema(&self) -> &KeySchema {
        &self.schema
    }

    /// Whether provider fields are mirrored into the store
    #[must_use]
    pub const fn persist_fields(&self) -> bool {
        self.persist_fields
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Schema version recorded in the store
    pub fn version(&self) -> MetaStoreResult<String> {
        self.get_string(&self.schema.version_key())
    }

    // ---- Pass-throughs ----

    pub fn put(&self, key: &str, value: &[u8]) -> MetaStoreResult<()> {
        debug!("put '{}'", key);
        self.backend
            .put(key, value)
            .map_err(|e| MetaStoreError::backend("put", key, e))
    }

    pub fn get(&self, key: &str) -> MetaStoreResult<Vec<u8>> {
        self.backend
            .get(key)
            .map_err(|e| MetaStoreError::backend("get", key, e))
    }

    pub fn get_string(&self, key: &str) -> MetaStoreResult<String> {
        self.get(key)
            .map(|v| String::from_utf8_lossy(&v).into_owned())
    }

    /// Every pair under `prefix`. An empty prefix is reported as a
    /// not-found `List` error, never as an empty vector.
    pub fn list(&self, prefix: &str) -> MetaStoreResult<Vec<KvPair>> {
        self.backend.list(prefix).map_err(|source| MetaStoreError::List {
            key: prefix.to_string(),
            source,
        })
    }

    pub fn delete(&self, key: &str) -> MetaStoreResult<()> {
        debug!("delete '{}'", key);
        self.backend
            .delete(key)
            .map_err(|e| MetaStoreError::backend("delete", key, e))
    }

    pub fn delete_tree(&self, prefix: &str) -> MetaStoreResult<()> {
        debug!("delete tree '{}'", prefix);
        self.backend
            .delete_tree(prefix)
            .map_err(|e| MetaStoreError::backend("delete_tree", prefix, e))
    }

    pub fn exists(&self, key: &str) -> MetaStoreResult<bool> {
        self.backend
            .exists(key)
            .map_err(|e| MetaStoreError::backend("exists", key, e))
    }

    // ---- Maintenance ----

    /// Drop every entry of `category` and re-create its root
    pub fn erase_category(&self, category: Category) -> MetaStoreResult<()> {
        let root = self.schema.root_key(category);
        self.delete_tree(&root)?;
        self.put(&root, b"")?;
        info!("Erased category {}", category);
        Ok(())
    }

    /// Erase every category
    pub fn erase_store(&self) -> MetaStoreResult<()> {
        for category in Category::ALL {
            self.erase_category(category)?;
        }
        Ok(())
    }
}
