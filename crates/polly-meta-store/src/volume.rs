//! Volume overlay record lifecycle.
//!
//! A record spans three categories. The index subtree holds the existence
//! marker, the scheduler list and the owning service; admin labels live in
//! their own subtree; provider fields are mirrored only when
//! `persist_fields` is enabled.

use crate::error::MetaStoreResult;
use crate::keys::Category;
use crate::labels::{LabelReconciler, check_leaf};
use crate::schedulers::{self, SCHEDULERS_LEAF};
use crate::store::MetaStore;
use polly_common::{OverlayId, Volume};
use tracing::{debug, info, warn};

/// Existence marker leaf; its value is the overlay id
pub const ID_LEAF: &str = "ID";
/// Leaf holding the owning service name
pub const SERVICE_NAME_LEAF: &str = "ServiceName";

impl MetaStore {
    /// Whether an overlay record for `id` has been saved
    pub fn volume_exists(&self, id: &OverlayId) -> MetaStoreResult<bool> {
        let key = self.schema().object_key(Category::INDEX, id.as_str())?;
        let marker = format!("{key}{ID_LEAF}");
        let exists = self.exists(&marker)?;
        debug!("Existence of '{}': {}", marker, exists);
        Ok(exists)
    }

    /// Write the overlay record of `volume`. Steps run in order and stop at
    /// the first failure; earlier writes are not rolled back. Label keys are
    /// checked before anything is written.
    pub fn save_volume(&self, volume: &Volume) -> MetaStoreResult<()> {
        let id = volume.overlay_id.as_str();
        let key = self.schema().object_key(Category::INDEX, id)?;
        for leaf in volume.labels.keys() {
            check_leaf(leaf)?;
        }
        info!("Saving overlay record {}", id);

        self.put(&key, b"")?;
        self.put(&format!("{key}{ID_LEAF}"), id.as_bytes())?;

        let schedulers_key = format!("{key}{SCHEDULERS_LEAF}");
        match schedulers::encode(&schedulers_key, &volume.schedulers)? {
            Some(encoded) => self.put(&schedulers_key, &encoded)?,
            None => self.delete(&schedulers_key)?,
        }

        self.put(
            &format!("{key}{SERVICE_NAME_LEAF}"),
            volume.service_name.as_bytes(),
        )?;

        if self.persist_fields() {
            LabelReconciler::new(self, Category::ExternalFields).save(id, volume.fields())?;
        }

        LabelReconciler::new(self, Category::AdminLabels).save(id, &volume.labels)
    }

    /// Merge the stored overlay onto `volume`.
    ///
    /// Returns `false` and leaves `volume` untouched when no record exists.
    /// A failing existence check counts as "no record".
    pub fn load_volume(&self, volume: &mut Volume) -> MetaStoreResult<bool> {
        let id = volume.overlay_id.as_str().to_string();
        let key = self.schema().object_key(Category::INDEX, &id)?;

        match self.volume_exists(&volume.overlay_id) {
            Ok(true) => {}
            Ok(false) => {
                debug!("No overlay record for {}", id);
                return Ok(false);
            }
            Err(e) => {
                warn!("Existence check for {} failed, treating as absent: {}", id, e);
                return Ok(false);
            }
        }

        let mut stored_schedulers = Vec::new();
        let mut service_name = None;
        for pair in self.list(&key)? {
            let Some(leaf) = pair.key.strip_prefix(&key) else {
                continue;
            };
            match leaf {
                SCHEDULERS_LEAF => stored_schedulers = schedulers::decode(&pair.key, &pair.value)?,
                SERVICE_NAME_LEAF => service_name = Some(pair.value_str()),
                _ => {}
            }
        }

        let labels = LabelReconciler::new(self, Category::AdminLabels).load(&id)?;
        let stored_fields = if self.persist_fields() {
            LabelReconciler::new(self, Category::ExternalFields).load(&id)?
        } else {
            Default::default()
        };

        volume.schedulers = stored_schedulers;
        if let Some(service_name) = service_name {
            volume.service_name = service_name;
        }
        volume.labels = labels;
        for (field, value) in stored_fields {
            volume.external.fields.entry(field).or_insert(value);
        }
        Ok(true)
    }

    /// Delete the record from every volume category
    pub fn remove_volume(&self, id: &OverlayId) -> MetaStoreResult<()> {
        for category in Category::VOLUME {
            let key = self.schema().object_key(category, id.as_str())?;
            self.delete_tree(&key)?;
        }
        info!("Removed overlay record {}", id);
        Ok(())
    }

    /// Every overlay id with an existence marker
    pub fn volume_ids(&self) -> MetaStoreResult<Vec<OverlayId>> {
        let root = self.schema().root_key(Category::INDEX);
        let pairs = match self.list(&root) {
            Ok(pairs) => pairs,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let depth = self.schema().leaf_depth();
        let ids = pairs
            .iter()
            .filter(|pair| pair.key.split('/').count() == depth)
            .filter_map(|pair| pair.key.strip_prefix(&root))
            .filter_map(|rest| rest.strip_suffix(ID_LEAF))
            .filter_map(|rest| rest.strip_suffix('/'))
            .filter(|id| !id.is_empty())
            .map(OverlayId::new_unchecked)
            .collect();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polly_common::ExternalVolume;

    fn volume(service: &str, id: &str) -> Volume {
        Volume::from_external(
            service,
            ExternalVolume {
                id: id.to_string(),
                ..ExternalVolume::default()
            },
        )
    }

    #[test]
    fn test_save_layout() {
        let store = MetaStore::in_memory().unwrap();
        let mut vol = volume("mock", "vol-000");
        vol.schedulers = vec!["mesos".into()];
        vol.labels.insert("k1".into(), "v1".into());
        store.save_volume(&vol).unwrap();

        let base = "polly/volumeinternallabels/mock-vol-000/";
        assert_eq!(store.get_string(&format!("{base}ID")).unwrap(), "mock-vol-000");
        assert_eq!(
            store.get_string(&format!("{base}Schedulers")).unwrap(),
            r#"["mesos"]"#
        );
        assert_eq!(
            store.get_string(&format!("{base}ServiceName")).unwrap(),
            "mock"
        );
        assert_eq!(
            store.get_string("polly/volumeadmin/mock-vol-000/k1").unwrap(),
            "v1"
        );
        assert!(!store.exists("polly/volumelibstorage/mock-vol-000/").unwrap());
    }

    #[test]
    fn test_empty_schedulers_delete_key() {
        let store = MetaStore::in_memory().unwrap();
        let mut vol = volume("mock", "vol-000");
        vol.schedulers = vec!["mesos".into()];
        store.save_volume(&vol).unwrap();
        vol.schedulers.clear();
        store.save_volume(&vol).unwrap();

        assert!(
            !store
                .exists("polly/volumeinternallabels/mock-vol-000/Schedulers")
                .unwrap()
        );
        let mut loaded = volume("mock", "vol-000");
        assert!(store.load_volume(&mut loaded).unwrap());
        assert!(loaded.schedulers.is_empty());
    }

    #[test]
    fn test_load_absent_leaves_volume_untouched() {
        let store = MetaStore::in_memory().unwrap();
        let mut vol = volume("mock", "vol-009");
        vol.labels.insert("live".into(), "yes".into());
        let before = vol.clone();

        assert!(!store.load_volume(&mut vol).unwrap());
        assert_eq!(vol, before);
    }

    #[test]
    fn test_corrupt_schedulers() {
        let store = MetaStore::in_memory().unwrap();
        let vol = volume("mock", "vol-000");
        store.save_volume(&vol).unwrap();
        store
            .put("polly/volumeinternallabels/mock-vol-000/Schedulers", b"{")
            .unwrap();

        let mut loaded = volume("mock", "vol-000");
        assert!(matches!(
            store.load_volume(&mut loaded),
            Err(crate::MetaStoreError::Serialization { .. })
        ));
    }

    #[test]
    fn test_nested_label_key_writes_nothing() {
        let store = MetaStore::in_memory().unwrap();
        let mut vol = volume("mock", "vol-000");
        vol.labels.insert("app/tier".into(), "web".into());

        assert!(matches!(
            store.save_volume(&vol),
            Err(crate::MetaStoreError::InvalidIdentifier(_))
        ));
        assert!(!store.volume_exists(&vol.overlay_id).unwrap());
        assert!(
            !store
                .exists("polly/volumeadmin/mock-vol-000/app/tier")
                .unwrap()
        );
    }

    #[test]
    fn test_volume_ids_exact_form() {
        let store = MetaStore::in_memory().unwrap();
        store.save_volume(&volume("mock", "vol-000")).unwrap();
        store.save_volume(&volume("mock", "vol-001")).unwrap();
        // Deeper keys and foreign leaves are not ids
        store
            .put("polly/volumeinternallabels/x/nested/ID", b"x")
            .unwrap();
        store.put("polly/volumeinternallabels/y/Other", b"y").unwrap();

        let mut ids: Vec<String> = store
            .volume_ids()
            .unwrap()
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, ["mock-vol-000", "mock-vol-001"]);
    }

    #[test]
    fn test_persisted_fields_do_not_override_live() {
        let config = polly_common::StoreConfig {
            persist_fields: true,
            ..polly_common::StoreConfig::memory()
        };
        let store =
            MetaStore::with_backend(Box::new(crate::MemoryBackend::new()), &config).unwrap();

        let mut vol = volume("mock", "vol-000");
        vol.external.fields.insert("tier".into(), "gold".into());
        vol.external.fields.insert("rack".into(), "r1".into());
        store.save_volume(&vol).unwrap();
        assert_eq!(
            store
                .get_string("polly/volumelibstorage/mock-vol-000/tier")
                .unwrap(),
            "gold"
        );

        let mut live = volume("mock", "vol-000");
        live.external.fields.insert("tier".into(), "silver".into());
        assert!(store.load_volume(&mut live).unwrap());
        assert_eq!(live.fields()["tier"], "silver");
        assert_eq!(live.fields()["rack"], "r1");
    }
}
