//! Converges an object's key subtree onto a desired string map.

use crate::error::{MetaStoreError, MetaStoreResult};
use crate::keys::{Category, parse_leaf_key};
use crate::store::MetaStore;
use std::collections::HashMap;
use tracing::debug;

/// A leaf name must be a single non-empty key segment
pub fn check_leaf(leaf: &str) -> MetaStoreResult<()> {
    if leaf.trim().is_empty() || leaf.contains('/') {
        return Err(MetaStoreError::InvalidIdentifier(format!(
            "label key '{leaf}' must be non-empty and contain no '/'"
        )));
    }
    Ok(())
}

/// Saves and loads a flat `leaf -> value` map stored under
/// `<root>/<category>/<id>/`.
pub struct LabelReconciler<'a> {
    store: &'a MetaStore,
    category: Category,
}

impl<'a> LabelReconciler<'a> {
    #[must_use]
    pub const fn new(store: &'a MetaStore, category: Category) -> Self {
        Self { store, category }
    }

    /// Make the subtree hold exactly `labels`: stale leaves are deleted and
    /// every desired pair is written. Nothing is written when a leaf name
    /// fails [`check_leaf`].
    pub fn save(&self, id: &str, labels: &HashMap<String, String>) -> MetaStoreResult<()> {
        for leaf in labels.keys() {
            check_leaf(leaf)?;
        }
        let key = self.store.schema().object_key(self.category, id)?;
        self.store.put(&key, b"")?;

        let current = self.store.list(&key)?;
        for pair in &current {
            let Ok(leaf) = parse_leaf_key(&pair.key) else {
                continue;
            };
            if !leaf.is_empty() && !labels.contains_key(leaf) {
                debug!("Dropping stale {} entry '{}'", self.category, pair.key);
                self.store.delete(&pair.key)?;
            }
        }

        for (leaf, value) in labels {
            self.store.put(&format!("{key}{leaf}"), value.as_bytes())?;
        }
        Ok(())
    }

    /// Read the subtree back into a map. A missing subtree is an empty map.
    pub fn load(&self, id: &str) -> MetaStoreResult<HashMap<String, String>> {
        let key = self.store.schema().object_key(self.category, id)?;
        let pairs = match self.store.list(&key) {
            Ok(pairs) => pairs,
            Err(e) if e.is_not_found() => return Ok(HashMap::new()),
            Err(e) => return Err(e),
        };

        let mut labels = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            match parse_leaf_key(&pair.key) {
                Ok("") | Err(_) => {}
                Ok(leaf) => {
                    labels.insert(leaf.to_string(), pair.value_str());
                }
            }
        }
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_labels_converge() {
        let store = MetaStore::in_memory().unwrap();
        let labels = LabelReconciler::new(&store, Category::AdminLabels);

        labels.save("mock-vol-000", &map(&[("a", "1"), ("b", "2")])).unwrap();
        labels.save("mock-vol-000", &map(&[("b", "3"), ("c", "4")])).unwrap();

        assert_eq!(
            labels.load("mock-vol-000").unwrap(),
            map(&[("b", "3"), ("c", "4")])
        );
        assert!(!store.exists("polly/volumeadmin/mock-vol-000/a").unwrap());
    }

    #[test]
    fn test_save_empty_keeps_marker() {
        let store = MetaStore::in_memory().unwrap();
        let labels = LabelReconciler::new(&store, Category::AdminLabels);

        labels.save("mock-vol-000", &map(&[("a", "1")])).unwrap();
        labels.save("mock-vol-000", &HashMap::new()).unwrap();

        assert!(labels.load("mock-vol-000").unwrap().is_empty());
        assert!(store.exists("polly/volumeadmin/mock-vol-000/").unwrap());
    }

    #[test]
    fn test_load_missing_is_empty() {
        let store = MetaStore::in_memory().unwrap();
        let labels = LabelReconciler::new(&store, Category::Snapshot);
        assert!(labels.load("mock-snap-1").unwrap().is_empty());
    }

    #[test]
    fn test_categories_are_isolated() {
        let store = MetaStore::in_memory().unwrap();
        LabelReconciler::new(&store, Category::AdminLabels)
            .save("mock-vol-000", &map(&[("a", "1")]))
            .unwrap();
        assert!(
            LabelReconciler::new(&store, Category::ExternalFields)
                .load("mock-vol-000")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_nested_leaf_rejected() {
        let store = MetaStore::in_memory().unwrap();
        let labels = LabelReconciler::new(&store, Category::AdminLabels);
        labels.save("mock-vol-000", &map(&[("a", "1")])).unwrap();

        let err = labels
            .save("mock-vol-000", &map(&[("app/tier", "web"), ("b", "2")]))
            .unwrap_err();
        assert!(matches!(err, MetaStoreError::InvalidIdentifier(_)));

        assert_eq!(labels.load("mock-vol-000").unwrap(), map(&[("a", "1")]));
        assert!(!store.exists("polly/volumeadmin/mock-vol-000/app/tier").unwrap());
        assert!(!store.exists("polly/volumeadmin/mock-vol-000/b").unwrap());
    }

    #[test]
    fn test_empty_leaf_rejected() {
        let store = MetaStore::in_memory().unwrap();
        let labels = LabelReconciler::new(&store, Category::AdminLabels);

        for leaf in ["", " "] {
            assert!(matches!(
                labels.save("mock-vol-001", &map(&[(leaf, "v")])),
                Err(MetaStoreError::InvalidIdentifier(_))
            ));
        }
        assert!(!store.exists("polly/volumeadmin/mock-vol-001/").unwrap());
        assert!(labels.load("mock-vol-001").unwrap().is_empty());
    }

    #[test]
    fn test_empty_id_rejected() {
        let store = MetaStore::in_memory().unwrap();
        let labels = LabelReconciler::new(&store, Category::AdminLabels);
        assert!(labels.save(" ", &HashMap::new()).is_err());
        assert!(labels.load("").is_err());
    }
}
