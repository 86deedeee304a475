//! Scheduler set operations and their stored encoding.
//!
//! A volume's schedulers are an ordered list without duplicates, stored as a
//! JSON array under the `Schedulers` leaf of the index subtree.

use crate::error::{MetaStoreError, MetaStoreResult};

/// Leaf holding the encoded scheduler list
pub const SCHEDULERS_LEAF: &str = "Schedulers";

/// Replace the current set with `requested`, keeping the first occurrence
/// of each name.
#[must_use]
pub fn offer(_current: &[String], requested: &[String]) -> Vec<String> {
    dedup(requested)
}

/// Remove every name in `remove` from `current`, preserving order.
/// Names that are not members are ignored.
#[must_use]
pub fn revoke(current: &[String], remove: &[String]) -> Vec<String> {
    current
        .iter()
        .filter(|s| !remove.contains(s))
        .cloned()
        .collect()
}

/// Drop repeated names, keeping the first occurrence
#[must_use]
pub fn dedup(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}

/// Encode for storage. An empty list has no stored form.
pub fn encode(key: &str, schedulers: &[String]) -> MetaStoreResult<Option<Vec<u8>>> {
    if schedulers.is_empty() {
        return Ok(None);
    }
    serde_json::to_vec(schedulers)
        .map(Some)
        .map_err(|source| MetaStoreError::Serialization {
            key: key.to_string(),
            source,
        })
}

pub fn decode(key: &str, value: &[u8]) -> MetaStoreResult<Vec<String>> {
    serde_json::from_slice(value).map_err(|source| MetaStoreError::Serialization {
        key: key.to_string(),
        source,
    })
}
