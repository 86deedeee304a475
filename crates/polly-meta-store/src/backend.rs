//! Hierarchical key-value backends.
//!
//! Keys are `/`-separated paths and values are opaque bytes. Two backends are
//! provided: an embedded redb database (also selected by the legacy `boltdb`
//! name) and an in-memory map for tests and dry runs.

use parking_lot::RwLock;
use redb::{Database, DatabaseError, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Error type for backend operations
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("key not found: '{0}'")]
    KeyNotFound(String),
    #[error("redb error: {0}")]
    Database(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("timed out after {timeout:?} waiting for {path} to be released")]
    OpenTimeout { path: PathBuf, timeout: Duration },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for BackendError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl BackendError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// One stored entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
}

impl KvPair {
    /// Value decoded as UTF-8, replacing invalid sequences
    #[must_use]
    pub fn value_str(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}

/// Hierarchical key-value store
///
/// `list` on a prefix holding no keys fails with `KeyNotFound`. `delete` of
/// an absent key succeeds. `delete_tree` removes every key under the prefix.
pub trait KvBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    fn put(&self, key: &str, value: &[u8]) -> BackendResult<()>;

    /// Value at `key`, or `KeyNotFound`
    fn get(&self, key: &str) -> BackendResult<Vec<u8>>;

    /// Every entry whose key starts with `prefix`, in key order
    fn list(&self, prefix: &str) -> BackendResult<Vec<KvPair>>;

    fn delete(&self, key: &str) -> BackendResult<()>;

    fn delete_tree(&self, prefix: &str) -> BackendResult<()>;

    fn exists(&self, key: &str) -> BackendResult<bool>;
}

/// Supported backend kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Embedded redb database file
    Redb,
    /// Process-local map
    Memory,
}

impl BackendKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Redb => "redb",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redb" | "boltdb" | "bolt" => Ok(Self::Redb),
            "memory" | "mem" | "inmemory" => Ok(Self::Memory),
            _ => Err(format!("unknown backend kind: {s}")),
        }
    }
}

/// Backend stored in a single redb table
pub struct RedbBackend {
    db: Database,
    bucket: String,
}

impl RedbBackend {
    /// Open (or create) the database at `path`. While another handle holds
    /// the file, opening is retried until `timeout` elapses.
    pub fn open(path: impl AsRef<Path>, bucket: &str, timeout: Duration) -> BackendResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let deadline = Instant::now() + timeout;
        let db = loop {
            match Database::create(path) {
                Ok(db) => break db,
                Err(DatabaseError::DatabaseAlreadyOpen) if Instant::now() < deadline => {
                    debug!("Database {} is busy, retrying", path.display());
                    std::thread::sleep(OPEN_RETRY_INTERVAL);
                }
                Err(DatabaseError::DatabaseAlreadyOpen) => {
                    return Err(BackendError::OpenTimeout {
                        path: path.to_path_buf(),
                        timeout,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        let backend = Self {
            db,
            bucket: bucket.to_string(),
        };

        // Create the table eagerly so later read txns don't fail
        let write_txn = backend.db.begin_write()?;
        {
            let _t = write_txn.open_table(backend.table())?;
        }
        write_txn.commit()?;

        info!(
            "Opened redb backend at {} (table '{}')",
            path.display(),
            backend.bucket
        );
        Ok(backend)
    }

    fn table(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.bucket)
    }

    fn collect_prefix(
        table: &impl ReadableTable<&'static str, &'static [u8]>,
        prefix: &str,
    ) -> BackendResult<Vec<KvPair>> {
        let mut result = Vec::new();
        for entry in table.range(prefix..)? {
            let (k, v) = entry?;
            let key = k.value();
            if !key.starts_with(prefix) {
                break;
            }
            result.push(KvPair {
                key: key.to_string(),
                value: v.value().to_vec(),
            });
        }
        Ok(result)
    }
}

impl KvBackend for RedbBackend {
    fn name(&self) -> &'static str {
        BackendKind::Redb.name()
    }

    fn put(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.table())?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get(&self, key: &str) -> BackendResult<Vec<u8>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(self.table())?;
        table
            .get(key)?
            .map(|v| v.value().to_vec())
            .ok_or_else(|| BackendError::KeyNotFound(key.to_string()))
    }

    fn list(&self, prefix: &str) -> BackendResult<Vec<KvPair>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(self.table())?;
        let pairs = Self::collect_prefix(&table, prefix)?;
        if pairs.is_empty() {
            return Err(BackendError::KeyNotFound(prefix.to_string()));
        }
        Ok(pairs)
    }

    fn delete(&self, key: &str) -> BackendResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.table())?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_tree(&self, prefix: &str) -> BackendResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.table())?;
            let keys: Vec<String> = Self::collect_prefix(&table, prefix)?
                .into_iter()
                .map(|p| p.key)
                .collect();
            for key in &keys {
                table.remove(key.as_str())?;
            }
            debug!("Deleted {} keys under '{}'", keys.len(), prefix);
        }
        write_txn.commit()?;
        Ok(())
    }

    fn exists(&self, key: &str) -> BackendResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(self.table())?;
        Ok(table.get(key)?.is_some())
    }
}

/// Process-local backend
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn keys_with_prefix(entries: &BTreeMap<String, Vec<u8>>, prefix: &str) -> Vec<String> {
        entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

impl KvBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        BackendKind::Memory.name()
    }

    fn put(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> BackendResult<Vec<u8>> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::KeyNotFound(key.to_string()))
    }

    fn list(&self, prefix: &str) -> BackendResult<Vec<KvPair>> {
        let entries = self.entries.read();
        let pairs: Vec<KvPair> = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KvPair {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        if pairs.is_empty() {
            return Err(BackendError::KeyNotFound(prefix.to_string()));
        }
        Ok(pairs)
    }

    fn delete(&self, key: &str) -> BackendResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn delete_tree(&self, prefix: &str) -> BackendResult<()> {
        let mut entries = self.entries.write();
        for key in Self::keys_with_prefix(&entries, prefix) {
            entries.remove(&key);
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> BackendResult<bool> {
        Ok(self.entries.read().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(backend: &dyn KvBackend) {
        backend.put("polly/a/x/", b"").unwrap();
        backend.put("polly/a/x/k1", b"v1").unwrap();
        backend.put("polly/a/x/k2", b"v2").unwrap();
        backend.put("polly/a/y/k1", b"v3").unwrap();
        backend.put("polly/b/z/k1", b"v4").unwrap();

        assert_eq!(backend.get("polly/a/x/k1").unwrap(), b"v1");
        assert!(backend.get("polly/a/x/missing").unwrap_err().is_not_found());
        assert!(backend.exists("polly/a/y/k1").unwrap());
        assert!(!backend.exists("polly/a/y/k2").unwrap());

        let listed = backend.list("polly/a/x/").unwrap();
        let keys: Vec<&str> = listed.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, ["polly/a/x/", "polly/a/x/k1", "polly/a/x/k2"]);
        assert_eq!(listed[1].value_str(), "v1");

        assert!(backend.list("polly/c/").unwrap_err().is_not_found());

        backend.delete("polly/a/x/k2").unwrap();
        backend.delete("polly/a/x/k2").unwrap();
        assert!(!backend.exists("polly/a/x/k2").unwrap());

        backend.delete_tree("polly/a/").unwrap();
        assert!(backend.list("polly/a/").unwrap_err().is_not_found());
        assert!(backend.exists("polly/b/z/k1").unwrap());

        backend.delete_tree("polly/nothing/").unwrap();
    }

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        exercise(&backend);
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_redb_backend() {
        let dir = tempdir().unwrap();
        let backend =
            RedbBackend::open(dir.path().join("polly.redb"), "polly", Duration::from_secs(1))
                .unwrap();
        exercise(&backend);
    }

    #[test]
    fn test_redb_backend_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("polly.redb");
        {
            let backend = RedbBackend::open(&path, "polly", Duration::from_secs(1)).unwrap();
            backend.put("polly/version", b"v0.1.0").unwrap();
        }
        let backend = RedbBackend::open(&path, "polly", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.get("polly/version").unwrap(), b"v0.1.0");
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("redb".parse::<BackendKind>().unwrap(), BackendKind::Redb);
        assert_eq!("boltdb".parse::<BackendKind>().unwrap(), BackendKind::Redb);
        assert_eq!("Memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("consul".parse::<BackendKind>().is_err());
        assert!("etcd".parse::<BackendKind>().is_err());
    }
}
