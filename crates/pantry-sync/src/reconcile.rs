//! Pull side: bring remote snapshots into the local store.
//!
//! Local state wins whenever it has something the remote has not seen yet.
//! A remote snapshot is applied only if all of these hold:
//!
//! - every sync record of the item is `synced` (or it has none)
//! - the local copy is not terminal while the remote one is active
//! - the item is unknown locally, or the remote `updated_at` is newer

use serde::Serialize;
use tracing::{debug, info};

use pantry_core::{InventoryItem, SyncState};

use crate::error::{SyncError, SyncResult};
use crate::service::{item_lock_key, InventoryService};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub fetched: usize,
    pub applied: usize,
    pub skipped_unsynced: usize,
    pub skipped_terminal: usize,
    pub unchanged: usize,
}

enum Applied {
    Yes,
    Unsynced,
    Terminal,
    Unchanged,
}

impl InventoryService {
    /// Fetches the household's active items from the remote and applies the
    /// ones that are safe to take. Writes here are never queued for push.
    ///
    /// ## Errors
    /// - `ConnectivityUnavailable` when offline
    /// - `Remote` if the fetch fails
    pub async fn refresh_from_remote(&self, household_id: &str) -> SyncResult<RefreshReport> {
        if !self.connectivity.is_online() {
            return Err(SyncError::offline("refresh_from_remote"));
        }

        let remote_items = self
            .remote
            .fetch_active_items(household_id)
            .await
            .map_err(|e| SyncError::remote("refresh_from_remote", e))?;

        let mut report = RefreshReport {
            fetched: remote_items.len(),
            ..Default::default()
        };

        for remote in remote_items.into_iter().filter(|i| i.household_id == household_id) {
            match self.apply_remote(remote).await? {
                Applied::Yes => report.applied += 1,
                Applied::Unsynced => report.skipped_unsynced += 1,
                Applied::Terminal => report.skipped_terminal += 1,
                Applied::Unchanged => report.unchanged += 1,
            }
        }

        info!(
            household_id,
            fetched = report.fetched,
            applied = report.applied,
            skipped_unsynced = report.skipped_unsynced,
            "Refreshed from remote"
        );
        Ok(report)
    }

    async fn apply_remote(&self, remote: InventoryItem) -> SyncResult<Applied> {
        let _guard = self.locks.lock(&item_lock_key(&remote.id)).await;

        let records = self.sync_state.fetch_for_item(&remote.id, &remote.household_id).await?;
        if records.iter().any(|r| r.state != SyncState::Synced) {
            debug!(item_id = %remote.id, "Local changes not pushed yet; keeping local copy");
            return Ok(Applied::Unsynced);
        }

        match self.inventory.find_by_id(&remote.id, &remote.household_id).await? {
            Some(local) if local.status.is_terminal() && remote.is_active() => Ok(Applied::Terminal),
            Some(local) if local.updated_at >= remote.updated_at => Ok(Applied::Unchanged),
            _ => {
                self.inventory.upsert(&remote).await?;
                Ok(Applied::Yes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use pantry_core::{InventoryDraft, ItemStatus, Quantity, RemoteError};

    use crate::testing::{harness, ts, HOUSEHOLD, LOCATION};

    use super::*;

    fn remote_item(id: &str, pieces: f64) -> InventoryItem {
        let draft = InventoryDraft::new(HOUSEHOLD, "p1", Quantity::pieces(pieces), LOCATION);
        InventoryItem::from_draft(id, draft, ts(5)).unwrap()
    }

    #[tokio::test]
    async fn test_offline_refresh_fails() {
        let h = harness().await;
        h.connectivity.set_online(false);

        let err = h.service.refresh_from_remote(HOUSEHOLD).await.unwrap_err();
        assert!(matches!(err, SyncError::ConnectivityUnavailable { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_remote_error_is_returned() {
        let h = harness().await;
        h.remote.set_failure(Some(RemoteError::Rejected("forbidden".into()))).await;

        let err = h.service.refresh_from_remote(HOUSEHOLD).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unknown_items_are_applied_without_queueing() {
        let h = harness().await;
        h.remote.seed([remote_item("r1", 2.0)]).await;

        let report = h.service.refresh_from_remote(HOUSEHOLD).await.unwrap();
        assert_eq!(report.applied, 1);

        let local = h.service.get_item("r1", HOUSEHOLD).await.unwrap().unwrap();
        assert_eq!(local.quantity, Quantity::pieces(2.0));
        assert!(!h.service.sync_status(HOUSEHOLD).await.unwrap().has_unsynced());
    }

    #[tokio::test]
    async fn test_pending_local_change_wins() {
        let h = harness().await;
        let added = h
            .service
            .add(InventoryDraft::new(HOUSEHOLD, "p1", Quantity::pieces(1.0), LOCATION), None)
            .await
            .unwrap();

        let mut newer = added.item.clone();
        newer.quantity = Quantity::pieces(9.0);
        newer.updated_at = added.item.updated_at + Duration::hours(1);
        h.remote.seed([newer]).await;

        let report = h.service.refresh_from_remote(HOUSEHOLD).await.unwrap();
        assert_eq!(report.skipped_unsynced, 1);
        let local = h.service.get_item(&added.item.id, HOUSEHOLD).await.unwrap().unwrap();
        assert_eq!(local.quantity, Quantity::pieces(1.0));
    }

    #[tokio::test]
    async fn test_synced_item_takes_newer_remote() {
        let h = harness().await;
        let added = h
            .service
            .add(InventoryDraft::new(HOUSEHOLD, "p1", Quantity::pieces(1.0), LOCATION), None)
            .await
            .unwrap();
        h.service.sync_pending(HOUSEHOLD).await.unwrap();

        let report = h.service.refresh_from_remote(HOUSEHOLD).await.unwrap();
        assert_eq!(report.unchanged, 1);

        let mut newer = added.item.clone();
        newer.quantity = Quantity::pieces(4.0);
        newer.updated_at = added.item.updated_at + Duration::hours(1);
        h.remote.seed([newer]).await;

        let report = h.service.refresh_from_remote(HOUSEHOLD).await.unwrap();
        assert_eq!(report.applied, 1);
        let local = h.service.get_item(&added.item.id, HOUSEHOLD).await.unwrap().unwrap();
        assert_eq!(local.quantity, Quantity::pieces(4.0));
    }

    #[tokio::test]
    async fn test_terminal_local_is_not_resurrected() {
        let h = harness().await;
        let added = h
            .service
            .add(InventoryDraft::new(HOUSEHOLD, "p1", Quantity::pieces(1.0), LOCATION), None)
            .await
            .unwrap();

        // A stale active copy from before the discard.
        let mut stale = added.item.clone();
        stale.updated_at = added.item.updated_at + Duration::hours(2);
        h.remote.seed([stale]).await;

        h.service.discard(&added.item.id, HOUSEHOLD).await.unwrap();
        h.service.sync_pending(HOUSEHOLD).await.unwrap();

        let report = h.service.refresh_from_remote(HOUSEHOLD).await.unwrap();
        assert_eq!(report.skipped_terminal, 1);
        let local = h.service.get_item(&added.item.id, HOUSEHOLD).await.unwrap().unwrap();
        assert_eq!(local.status, ItemStatus::Discarded);
    }
}
