//! Polly Metadata Store - hierarchical key-value overlay storage
//!
//! This crate persists the administrative overlay of externally owned
//! volumes: the key layout, pluggable backends, label convergence, scheduler
//! set operations and the volume and snapshot record lifecycles.

pub mod backend;
pub mod error;
pub mod keys;
pub mod labels;
pub mod schedulers;
pub mod snapshot;
pub mod store;
pub mod volume;

// Re-exports
pub use backend::{BackendError, BackendKind, KvBackend, KvPair, MemoryBackend, RedbBackend};
pub use error::{MetaStoreError, MetaStoreResult};
pub use keys::{Category, KeySchema, parse_leaf_key};
pub use labels::{LabelReconciler, check_leaf};
pub use store::{MetaStore, STORE_VERSION};
