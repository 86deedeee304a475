//! Snapshot overlay: extension fields recorded per provider snapshot.

use crate::error::MetaStoreResult;
use crate::keys::Category;
use crate::labels::LabelReconciler;
use crate::store::MetaStore;
use polly_common::{OverlayId, SnapshotOverlay};
use tracing::info;

impl MetaStore {
    pub fn save_snapshot(&self, snapshot: &SnapshotOverlay) -> MetaStoreResult<()> {
        LabelReconciler::new(self, Category::Snapshot)
            .save(snapshot.snapshot_id.as_str(), &snapshot.fields)?;
        info!("Saved snapshot overlay {}", snapshot.snapshot_id);
        Ok(())
    }

    /// Replace `snapshot.fields` with the stored fields
    pub fn load_snapshot(&self, snapshot: &mut SnapshotOverlay) -> MetaStoreResult<()> {
        snapshot.fields =
            LabelReconciler::new(self, Category::Snapshot).load(snapshot.snapshot_id.as_str())?;
        Ok(())
    }

    pub fn remove_snapshot(&self, id: &OverlayId) -> MetaStoreResult<()> {
        let key = self.schema().object_key(Category::Snapshot, id.as_str())?;
        self.delete_tree(&key)?;
        info!("Removed snapshot overlay {}", id);
        Ok(())
    }
}
