//! Error types for volume operations

use crate::provider::ProviderError;
use polly_common::OverlayIdError;
use polly_meta_store::MetaStoreError;
use thiserror::Error;

pub type VolumeResult<T> = std::result::Result<T, VolumeError>;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("invalid volume id: {0}")]
    InvalidVolumeId(#[from] OverlayIdError),

    #[error("volume not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] MetaStoreError),
}

impl VolumeError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Provider(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// HTTP status code for boundary adapters
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidVolumeId(_)
            | Self::Store(MetaStoreError::InvalidIdentifier(_))
            | Self::Provider(ProviderError::InvalidServiceName(_)) => 400,

            // 404 Not Found
            Self::NotFound(_)
            | Self::Provider(ProviderError::ServiceNotFound(_) | ProviderError::VolumeNotFound { .. }) => {
                404
            }

            // 500 Internal Server Error
            _ => 500,
        }
    }
}
