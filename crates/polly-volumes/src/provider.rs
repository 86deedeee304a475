//! External volume provider interface.
//!
//! The provider owns the real volumes; Polly only reads its inventory and
//! forwards create and remove requests.

use polly_common::{CreateVolumeRequest, ExternalVolume, Volume};

/// Error returned by a volume provider
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("volume not found: {service}/{volume_id}")]
    VolumeNotFound { service: String, volume_id: String },

    #[error("illegal character in service name '{0}'")]
    InvalidServiceName(String),

    #[error("unsupported driver '{driver}' for service '{service}'")]
    UnsupportedDriver { service: String, driver: String },
}

impl ProviderError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ServiceNotFound(_) | Self::VolumeNotFound { .. }
        )
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Source of live volume inventory
pub trait VolumeProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Configured service names
    fn services(&self) -> Vec<String>;

    /// Volumes owned by one service
    fn volumes_by_service(&self, service: &str) -> ProviderResult<Vec<ExternalVolume>>;

    /// Volumes of every service, tagged with their service name
    fn volumes(&self) -> ProviderResult<Vec<Volume>> {
        let mut all = Vec::new();
        for service in self.services() {
            all.extend(
                self.volumes_by_service(&service)?
                    .into_iter()
                    .map(|ext| Volume::from_external(&service, ext)),
            );
        }
        Ok(all)
    }

    /// One live volume
    fn inspect(&self, service: &str, volume_id: &str) -> ProviderResult<ExternalVolume>;

    /// Create a volume in `service`
    fn create(&self, service: &str, request: &CreateVolumeRequest)
    -> ProviderResult<ExternalVolume>;

    /// Destroy a volume in `service`
    fn remove(&self, service: &str, volume_id: &str) -> ProviderResult<()>;
}
