//! Store export/import for backup and restoration during a live broadcast.

use super::AppState;
use crate::error::GameResult;
use crate::store::snapshot::StoreSnapshot;

impl AppState {
    pub async fn export_snapshot(&self) -> GameResult<StoreSnapshot> {
        let snapshot = self.store.export_snapshot().await?;
        tracing::info!(
            games = snapshot.games.len(),
            picks = snapshot.picks.len(),
            "Store snapshot exported"
        );
        Ok(snapshot)
    }

    /// Validate, then replace the store contents. Connected rooms keep their subscribers and
    /// pick up the restored data on the next recomputation.
    pub async fn import_snapshot(&self, snapshot: StoreSnapshot) -> GameResult<()> {
        snapshot.validate()?;
        self.store.import_snapshot(snapshot).await?;
        Ok(())
    }
}
