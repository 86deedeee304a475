//! Volume reconciler.
//!
//! Joins the live provider inventory with the stored overlay. Every inbound
//! volume is matched against its overlay record; depending on the existence
//! policy an unknown volume is either dropped or registered on the spot.

use crate::error::{VolumeError, VolumeResult};
use crate::filter::VolumeFilter;
use crate::provider::{ProviderError, VolumeProvider};
use dashmap::DashMap;
use parking_lot::Mutex;
use polly_common::{CreateVolumeRequest, OVERLAY_ID_SEPARATOR, OverlayId, OverlayIdError, Volume};
use polly_meta_store::{MetaStore, check_leaf, schedulers};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What to do with a volume that has no overlay record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Existence {
    /// Only volumes already registered are returned
    Required,
    /// Unregistered volumes get a fresh record
    Establish,
}

/// Merges provider volumes with their overlay records
pub struct VolumeReconciler {
    provider: Arc<dyn VolumeProvider>,
    store: Arc<MetaStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl VolumeReconciler {
    pub fn new(provider: Arc<dyn VolumeProvider>, store: Arc<MetaStore>) -> Self {
        Self {
            provider,
            store,
            locks: DashMap::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &MetaStore {
        &self.store
    }

    #[must_use]
    pub fn provider(&self) -> &dyn VolumeProvider {
        self.provider.as_ref()
    }

    /// Attach the stored overlay to `volume`.
    ///
    /// Returns `None` when the volume is unregistered and `existence` is
    /// [`Existence::Required`].
    pub fn reconcile(&self, volume: Volume, existence: Existence) -> VolumeResult<Option<Volume>> {
        let id = volume.overlay_id.clone();
        self.with_lock(&id, || self.reconcile_locked(volume, existence))
    }

    /// Registered volumes matching `filter`. Returned records are written
    /// back so the store follows the provider.
    pub fn list(&self, filter: &VolumeFilter) -> VolumeResult<Vec<Volume>> {
        let mut result = Vec::new();
        for volume in self.provider.volumes()? {
            let id = volume.overlay_id.clone();
            let listed = self.with_lock(&id, || {
                let Some(volume) = self.reconcile_locked(volume, Existence::Required)? else {
                    return Ok(None);
                };
                if !filter.matches(&volume) {
                    return Ok(None);
                }
                self.store.save_volume(&volume)?;
                Ok(Some(volume))
            })?;
            result.extend(listed);
        }
        debug!("Listed {} volumes from {}", result.len(), self.provider.name());
        Ok(result)
    }

    /// Every provider volume matching `filter`, registering unknown ones
    pub fn list_all(&self, filter: &VolumeFilter) -> VolumeResult<Vec<Volume>> {
        let mut all = Vec::new();
        for volume in self.provider.volumes()? {
            if let Some(volume) = self.reconcile(volume, Existence::Establish)? {
                all.push(volume);
            }
        }
        Ok(filter.apply(all))
    }

    /// Live volume with its overlay, registering it if needed
    pub fn inspect(&self, id: &str) -> VolumeResult<Volume> {
        let overlay_id = OverlayId::parse(id)?;
        self.with_lock(&overlay_id, || self.inspect_locked(&overlay_id))
    }

    /// Offer the volume to `requested`, replacing the current schedulers
    pub fn offer(&self, id: &str, requested: &[String]) -> VolumeResult<Volume> {
        self.modify(id, |volume| {
            volume.schedulers = schedulers::offer(&volume.schedulers, requested);
        })
    }

    /// Withdraw the volume from `revoked`
    pub fn revoke(&self, id: &str, revoked: &[String]) -> VolumeResult<Volume> {
        self.modify(id, |volume| {
            volume.schedulers = schedulers::revoke(&volume.schedulers, revoked);
        })
    }

    /// Add or overwrite admin labels
    pub fn label(&self, id: &str, labels: &HashMap<String, String>) -> VolumeResult<Volume> {
        for key in labels.keys() {
            check_leaf(key)?;
        }
        self.modify(id, |volume| {
            volume
                .labels
                .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        })
    }

    /// Drop admin labels by key
    pub fn labels_remove(&self, id: &str, keys: &[String]) -> VolumeResult<Volume> {
        self.modify(id, |volume| {
            for key in keys {
                volume.labels.remove(key);
            }
        })
    }

    /// Create a volume through the provider and register it with the
    /// requester's schedulers and labels
    pub fn create(&self, request: &CreateVolumeRequest) -> VolumeResult<Volume> {
        let service = request.service_name.as_str();
        if service.is_empty() || service.contains(OVERLAY_ID_SEPARATOR) {
            return Err(ProviderError::InvalidServiceName(service.to_string()).into());
        }
        for key in request.labels.keys() {
            check_leaf(key)?;
        }

        let external = self.provider.create(service, request)?;
        let mut volume = Volume::from_external(service, external);
        volume.schedulers = schedulers::dedup(&request.schedulers);
        volume.labels.clone_from(&request.labels);

        let id = volume.overlay_id.clone();
        self.with_lock(&id, || Ok(self.store.save_volume(&volume)?))?;
        info!("Created volume {} via {}", volume.overlay_id, self.provider.name());
        Ok(volume)
    }

    /// Destroy the volume at the provider, then drop its overlay record.
    ///
    /// When the provider succeeds and the store fails, the record is left
    /// behind and the store error is returned.
    pub fn remove(&self, id: &str) -> VolumeResult<()> {
        let overlay_id = OverlayId::parse(id)?;
        let (service, volume_id) = split(&overlay_id)?;

        self.with_lock(&overlay_id, || {
            self.provider
                .inspect(service, volume_id)
                .map_err(|e| not_found(e, &overlay_id))?;
            self.provider.remove(service, volume_id)?;
            self.store.remove_volume(&overlay_id)?;
            Ok(())
        })?;
        info!("Removed volume {} via {}", overlay_id, self.provider.name());
        Ok(())
    }

    /// Inspect, apply `change`, save; serialized per overlay id
    fn modify<F>(&self, id: &str, change: F) -> VolumeResult<Volume>
    where
        F: FnOnce(&mut Volume),
    {
        let overlay_id = OverlayId::parse(id)?;
        self.with_lock(&overlay_id, || {
            let mut volume = self.inspect_locked(&overlay_id)?;
            change(&mut volume);
            self.store.save_volume(&volume)?;
            Ok(volume)
        })
    }

    fn inspect_locked(&self, overlay_id: &OverlayId) -> VolumeResult<Volume> {
        let (service, volume_id) = split(overlay_id)?;
        let external = self
            .provider
            .inspect(service, volume_id)
            .map_err(|e| not_found(e, overlay_id))?;

        self.reconcile_locked(Volume::from_external(service, external), Existence::Establish)?
            .ok_or_else(|| VolumeError::NotFound(overlay_id.to_string()))
    }

    fn reconcile_locked(&self, mut volume: Volume, existence: Existence) -> VolumeResult<Option<Volume>> {
        if self.store.load_volume(&mut volume)? {
            return Ok(Some(volume));
        }
        match existence {
            Existence::Required => {
                debug!("Dropping unregistered volume {}", volume.overlay_id);
                Ok(None)
            }
            Existence::Establish => {
                info!("Registering volume {}", volume.overlay_id);
                self.store.save_volume(&volume)?;
                Ok(Some(volume))
            }
        }
    }

    /// Run `f` holding the lock of `id`. The lock entry is dropped once no
    /// other caller holds or waits on it.
    fn with_lock<T>(&self, id: &OverlayId, f: impl FnOnce() -> VolumeResult<T>) -> VolumeResult<T> {
        let lock = self.locks.entry(id.to_string()).or_default().clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        self.locks
            .remove_if(id.as_str(), |_, entry| Arc::strong_count(entry) == 1);
        result
    }
}

fn split(id: &OverlayId) -> VolumeResult<(&str, &str)> {
    id.split()
        .ok_or_else(|| OverlayIdError::MissingSeparator(id.to_string()).into())
}

fn not_found(e: ProviderError, id: &OverlayId) -> VolumeError {
    if matches!(e, ProviderError::VolumeNotFound { .. }) {
        VolumeError::NotFound(id.to_string())
    } else {
        e.into()
    }
}
