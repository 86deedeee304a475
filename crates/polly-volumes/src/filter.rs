//! Volume query filter.
//!
//! A filter is a conjunction of `key = value` terms. A few keys compare
//! against typed volume attributes; any other key is looked up in the
//! volume's provider fields.

use polly_common::Volume;
use tracing::debug;

/// Conjunctive filter over volume attributes and fields
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VolumeFilter {
    terms: Vec<(String, String)>,
}

impl VolumeFilter {
    /// Filter matching every volume
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Build from query pairs. When a key repeats, the first value is used.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut terms: Vec<(String, String)> = Vec::new();
        for (key, value) in pairs {
            let key = key.into();
            if !terms.iter().any(|(k, _)| *k == key) {
                terms.push((key, value.into()));
            }
        }
        Self { terms }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether `volume` satisfies every term
    #[must_use]
    pub fn matches(&self, volume: &Volume) -> bool {
        self.terms.iter().all(|(key, value)| {
            let matched = term_matches(volume, key, value);
            if !matched {
                debug!("Rejected {} by {}={}", volume.overlay_id, key, value);
            }
            matched
        })
    }

    /// Keep only matching volumes
    #[must_use]
    pub fn apply(&self, volumes: Vec<Volume>) -> Vec<Volume> {
        volumes.into_iter().filter(|v| self.matches(v)).collect()
    }
}

fn term_matches(volume: &Volume, key: &str, value: &str) -> bool {
    match key {
        "availabilityZone" => volume.external.availability_zone == value,
        "iops" => value
            .parse::<i64>()
            .is_ok_and(|iops| volume.external.iops == iops),
        "size" => value
            .parse::<i64>()
            .is_ok_and(|size| volume.external.size == size),
        "serviceName" => volume.service_name == value,
        _ => volume.fields().get(key).is_some_and(|v| v == value),
    }
}
