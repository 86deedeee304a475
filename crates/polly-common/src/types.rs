//! Core type definitions for Polly
//!
//! This module defines the overlay identifier, the volume record as seen by
//! the external provider, the overlay-merged volume and the request types
//! accepted by the reconciler.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Separator between the service name and the external volume id
pub const OVERLAY_ID_SEPARATOR: char = '-';

/// Overlay identifier: `<serviceName>-<externalVolumeID>`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct OverlayId(String);

impl OverlayId {
    /// Build the overlay id for a volume owned by `service`
    #[must_use]
    pub fn new(service: &str, external_id: &str) -> Self {
        Self(format!("{service}{OVERLAY_ID_SEPARATOR}{external_id}"))
    }

    /// Parse a composite id, requiring a non-empty service and volume part
    pub fn parse(id: impl Into<String>) -> Result<Self, OverlayIdError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the overlay id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(service, external volume id)` on the first separator
    #[must_use]
    pub fn split(&self) -> Option<(&str, &str)> {
        self.0.split_once(OVERLAY_ID_SEPARATOR)
    }

    fn validate(id: &str) -> Result<(), OverlayIdError> {
        if id.is_empty() {
            return Err(OverlayIdError::Empty);
        }
        let Some((service, volume)) = id.split_once(OVERLAY_ID_SEPARATOR) else {
            return Err(OverlayIdError::MissingSeparator(id.to_string()));
        };
        if service.is_empty() {
            return Err(OverlayIdError::EmptyService(id.to_string()));
        }
        if volume.is_empty() {
            return Err(OverlayIdError::EmptyVolume(id.to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OverlayId({:?})", self.0)
    }
}

/// Errors that can occur when parsing an overlay id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverlayIdError {
    #[error("volume id must not be empty")]
    Empty,
    #[error("valid volume id is service-volume, got '{0}'")]
    MissingSeparator(String),
    #[error("volume id '{0}' has an empty service name")]
    EmptyService(String),
    #[error("volume id '{0}' has an empty external volume id")]
    EmptyVolume(String),
}

/// Volume as reported by the external provider
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalVolume {
    /// Provider-scoped volume id
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub availability_zone: String,
    /// Size in GiB, as reported by the provider
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub iops: i64,
    #[serde(default, rename = "type")]
    pub volume_type: String,
    #[serde(default)]
    pub status: String,
    /// Provider-defined extension fields, used for filtering only
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, String>,
}

/// Volume with its Polly overlay attached
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(flatten)]
    pub external: ExternalVolume,
    /// Overlay id (`<service>-<external id>`)
    #[serde(rename = "volumeid")]
    pub overlay_id: OverlayId,
    pub service_name: String,
    /// Schedulers the volume is currently offered to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schedulers: Vec<String>,
    /// Administrator labels
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Volume {
    /// Wrap a provider volume, deriving its overlay id from the service name
    #[must_use]
    pub fn from_external(service: &str, external: ExternalVolume) -> Self {
        Self {
            overlay_id: OverlayId::new(service, &external.id),
            service_name: service.to_string(),
            schedulers: Vec::new(),
            labels: HashMap::new(),
            external,
        }
    }

    /// Live provider fields
    #[must_use]
    pub const fn fields(&self) -> &HashMap<String, String> {
        &self.external.fields
    }
}

/// Request to create a volume through the provider and register its overlay
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVolumeRequest {
    #[serde(rename = "service")]
    pub service_name: String,
    pub name: String,
    #[serde(default)]
    pub volume_type: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub iops: i64,
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default)]
    pub schedulers: Vec<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

/// Snapshot overlay: extension fields recorded for a provider snapshot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotOverlay {
    #[serde(rename = "snapshotid")]
    pub snapshot_id: OverlayId,
    pub service_name: String,
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

impl SnapshotOverlay {
    #[must_use]
    pub fn new(service: &str, external_id: &str) -> Self {
        Self {
            snapshot_id: OverlayId::new(service, external_id),
            service_name: service.to_string(),
            fields: HashMap::new(),
        }
    }
}

/// Split a `key=value` argument. Entries without `=` or with an empty key
/// yield `None`.
#[must_use]
pub fn parse_label(label: &str) -> Option<(String, String)> {
    let (key, value) = label.split_once('=')?;
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// Build a label map from `key=value` arguments, skipping malformed entries
pub fn label_map<I, S>(labels: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .filter_map(|l| parse_label(l.as_ref()))
        .collect()
}
