//! In-process volume provider.
//!
//! Every service starts with three volumes, `vol-000` to `vol-002`. Created
//! volumes get the next free number.

use crate::provider::{ProviderError, ProviderResult, VolumeProvider};
use parking_lot::RwLock;
use polly_common::{
    CreateVolumeRequest, ExternalVolume, OVERLAY_ID_SEPARATOR, ServiceConfig,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Driver name accepted in service configuration
pub const MOCK_DRIVER: &str = "mock";

const SEEDED_VOLUMES: u64 = 3;

type Inventory = BTreeMap<String, BTreeMap<String, ExternalVolume>>;

/// Mock provider holding its inventory in memory
pub struct MockProvider {
    inventory: RwLock<Inventory>,
    next_id: AtomicU64,
}

impl MockProvider {
    /// Create a provider serving `services`, each seeded with three volumes
    pub fn new<I, S>(services: I) -> ProviderResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inventory = Inventory::new();
        for service in services {
            let service = service.into();
            if service.is_empty() || service.contains(OVERLAY_ID_SEPARATOR) {
                return Err(ProviderError::InvalidServiceName(service));
            }
            let volumes = (0..SEEDED_VOLUMES)
                .map(|n| {
                    let vol = seeded_volume(n);
                    (vol.id.clone(), vol)
                })
                .collect();
            inventory.insert(service, volumes);
        }
        Ok(Self {
            inventory: RwLock::new(inventory),
            next_id: AtomicU64::new(SEEDED_VOLUMES),
        })
    }

    /// Build from service configuration; only the mock driver is known
    pub fn from_config(services: &[ServiceConfig]) -> ProviderResult<Self> {
        if let Some(other) = services.iter().find(|s| s.driver != MOCK_DRIVER) {
            return Err(ProviderError::UnsupportedDriver {
                service: other.name.clone(),
                driver: other.driver.clone(),
            });
        }
        Self::new(services.iter().map(|s| s.name.clone()))
    }
}

fn seeded_volume(n: u64) -> ExternalVolume {
    ExternalVolume {
        id: format!("vol-{n:03}"),
        name: format!("Volume {n}"),
        availability_zone: "zone-a".to_string(),
        size: 10,
        iops: 100,
        volume_type: "gold".to_string(),
        status: "available".to_string(),
        ..ExternalVolume::default()
    }
}

impl VolumeProvider for MockProvider {
    fn name(&self) -> &str {
        MOCK_DRIVER
    }

    fn services(&self) -> Vec<String> {
        self.inventory.read().keys().cloned().collect()
    }

    fn volumes_by_service(&self, service: &str) -> ProviderResult<Vec<ExternalVolume>> {
        self.inventory
            .read()
            .get(service)
            .map(|vols| vols.values().cloned().collect())
            .ok_or_else(|| ProviderError::ServiceNotFound(service.to_string()))
    }

    fn inspect(&self, service: &str, volume_id: &str) -> ProviderResult<ExternalVolume> {
        let inventory = self.inventory.read();
        let vols = inventory
            .get(service)
            .ok_or_else(|| ProviderError::ServiceNotFound(service.to_string()))?;
        vols.get(volume_id)
            .cloned()
            .ok_or_else(|| ProviderError::VolumeNotFound {
                service: service.to_string(),
                volume_id: volume_id.to_string(),
            })
    }

    fn create(
        &self,
        service: &str,
        request: &CreateVolumeRequest,
    ) -> ProviderResult<ExternalVolume> {
        let mut inventory = self.inventory.write();
        let vols = inventory
            .get_mut(service)
            .ok_or_else(|| ProviderError::ServiceNotFound(service.to_string()))?;

        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let vol = ExternalVolume {
            id: format!("vol-{n:03}"),
            name: request.name.clone(),
            availability_zone: request.availability_zone.clone(),
            size: request.size,
            iops: request.iops,
            volume_type: request.volume_type.clone(),
            status: "available".to_string(),
            fields: request.fields.clone(),
        };
        debug!("Mock service {} created {}", service, vol.id);
        vols.insert(vol.id.clone(), vol.clone());
        Ok(vol)
    }

    fn remove(&self, service: &str, volume_id: &str) -> ProviderResult<()> {
        let mut inventory = self.inventory.write();
        let vols = inventory
            .get_mut(service)
            .ok_or_else(|| ProviderError::ServiceNotFound(service.to_string()))?;
        vols.remove(volume_id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::VolumeNotFound {
                service: service.to_string(),
                volume_id: volume_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_inventory() {
        let provider = MockProvider::new(["mock", "ebs"]).unwrap();
        assert_eq!(provider.services(), ["ebs", "mock"]);

        let ids: Vec<String> = provider
            .volumes_by_service("mock")
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, ["vol-000", "vol-001", "vol-002"]);

        let all = provider.volumes().unwrap();
        assert_eq!(all.len(), 6);
        assert!(all.iter().any(|v| v.overlay_id.as_str() == "ebs-vol-002"));
    }

    #[test]
    fn test_invalid_service_name() {
        assert!(matches!(
            MockProvider::new(["bad-name"]),
            Err(ProviderError::InvalidServiceName(_))
        ));
    }

    #[test]
    fn test_unsupported_driver() {
        let services = vec![ServiceConfig {
            name: "ebs".into(),
            driver: "ebs".into(),
        }];
        assert!(matches!(
            MockProvider::from_config(&services),
            Err(ProviderError::UnsupportedDriver { .. })
        ));
    }

    #[test]
    fn test_create_and_remove() {
        let provider = MockProvider::new(["mock"]).unwrap();
        let request = CreateVolumeRequest {
            service_name: "mock".into(),
            name: "data".into(),
            size: 20,
            ..CreateVolumeRequest::default()
        };
        let vol = provider.create("mock", &request).unwrap();
        assert_eq!(vol.id, "vol-003");
        assert_eq!(provider.inspect("mock", "vol-003").unwrap().size, 20);

        provider.remove("mock", "vol-003").unwrap();
        assert!(provider.inspect("mock", "vol-003").unwrap_err().is_not_found());
        assert!(provider.remove("mock", "vol-003").unwrap_err().is_not_found());
        assert!(provider.inspect("nope", "vol-000").unwrap_err().is_not_found());
    }
}
