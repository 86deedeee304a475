//! Polly Volumes - provider inventory joined with the metadata overlay
//!
//! This crate defines the external volume provider interface, an in-process
//! mock provider, the query filter and the reconciler that keeps overlay
//! records in step with the live inventory.

pub mod error;
pub mod filter;
pub mod mock;
pub mod provider;
pub mod reconciler;

pub use error::{VolumeError, VolumeResult};
pub use filter::VolumeFilter;
pub use mock::MockProvider;
pub use provider::{ProviderError, ProviderResult, VolumeProvider};
pub use reconciler::{Existence, VolumeReconciler};
