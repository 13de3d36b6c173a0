//! # Pending Drain
//!
//! Pushes locally committed changes to the remote.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sync_pending(household)                                               │
//! │                                                                         │
//! │  offline? ──yes──► SyncReport { offline: true }   (nothing touched)    │
//! │     │no                                                                 │
//! │     ▼                                                                   │
//! │  PENDING ∪ due retryable FAILED (batch_size each, retry order)         │
//! │     │                                                                   │
//! │     ▼  unique item ids                                                  │
//! │  buffer_unordered(fan_out)                                              │
//! │     │                                                                   │
//! │     ├── item A ─► lock A ─► re-read ─► push snapshot ─► SYNCED/FAILED   │
//! │     ├── item B ─► lock B ─► ...                                         │
//! │     └── item C ─► ...                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A push failure is recorded on the metadata (`retry_count`, `last_error`)
//! and never returned. Only local store failures end the drain with an error.

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use pantry_core::sync_meta::compare_for_retry;
use pantry_core::{SyncMetadata, SyncState};

use crate::error::SyncResult;
use crate::service::{item_lock_key, InventoryService};

/// Outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// True if the drain did nothing because the device is offline.
    pub offline: bool,
    /// Items whose snapshot the remote accepted.
    pub items_pushed: usize,
    pub records_synced: usize,
    pub records_failed: usize,
    /// Items whose push failed this round.
    pub failed_items: Vec<String>,
    /// Failed records left alone because they used up their attempts.
    pub skipped_exhausted: usize,
}

impl SyncReport {
    fn offline() -> Self {
        SyncReport {
            offline: true,
            ..Default::default()
        }
    }

    /// True if nothing was attempted.
    pub fn is_idle(&self) -> bool {
        self.items_pushed == 0 && self.failed_items.is_empty()
    }
}

enum ItemPush {
    Synced(usize),
    Failed(usize),
    Nothing,
}

impl InventoryService {
    /// Pushes every pending record of a household, plus failed records whose
    /// backoff has elapsed.
    ///
    /// Safe to call at any time: offline it returns at once, and records
    /// already synced are never pushed again.
    pub async fn sync_pending(&self, household_id: &str) -> SyncResult<SyncReport> {
        if !self.connectivity.is_online() {
            debug!(household_id, "Offline; skipping sync");
            return Ok(SyncReport::offline());
        }

        let now = self.clock.now();
        let limit = Some(self.sync_settings.batch_size);

        let mut records = self
            .sync_state
            .fetch_by_state(household_id, SyncState::Pending, limit)
            .await?;

        let max_attempts = self.retry.max_attempts;
        let mut report = SyncReport {
            skipped_exhausted: self.sync_state.count_exhausted(household_id, max_attempts).await? as usize,
            ..Default::default()
        };
        // Exhausted records are filtered in the query, so they never use up
        // the window that retryable ones need.
        records.extend(
            self.sync_state
                .fetch_retryable(household_id, max_attempts, limit)
                .await?
                .into_iter()
                .filter(|r| self.retry.is_due(r, now)),
        );

        if records.is_empty() {
            return Ok(report);
        }
        records.sort_by(compare_for_retry);

        let mut seen = HashSet::new();
        let item_ids: Vec<String> = records
            .into_iter()
            .filter(|r| seen.insert(r.item_id.clone()))
            .map(|r| r.item_id)
            .collect();

        debug!(household_id, items = item_ids.len(), "Draining sync records");

        let results: Vec<(String, SyncResult<ItemPush>)> = stream::iter(item_ids)
            .map(|item_id| async move {
                let result = self.push_item(household_id, &item_id).await;
                (item_id, result)
            })
            .buffer_unordered(self.sync_settings.fan_out.max(1))
            .collect()
            .await;

        for (item_id, result) in results {
            match result? {
                ItemPush::Synced(records) => {
                    report.items_pushed += 1;
                    report.records_synced += records;
                }
                ItemPush::Failed(records) => {
                    report.records_failed += records;
                    report.failed_items.push(item_id);
                }
                ItemPush::Nothing => {}
            }
        }
        report.failed_items.sort();

        info!(
            household_id,
            items_pushed = report.items_pushed,
            records_synced = report.records_synced,
            records_failed = report.records_failed,
            "Sync drain complete"
        );
        Ok(report)
    }

    /// Pushes one item's current snapshot and settles its open records.
    async fn push_item(&self, household_id: &str, item_id: &str) -> SyncResult<ItemPush> {
        let _guard = self.locks.lock(&item_lock_key(item_id)).await;
        let now = self.clock.now();

        // Another drain may have settled these while we waited.
        let mut open: Vec<SyncMetadata> = self
            .sync_state
            .fetch_for_item(item_id, household_id)
            .await?
            .into_iter()
            .filter(|r| match r.state {
                SyncState::Pending => true,
                SyncState::Failed => self.retry.is_eligible(r, now),
                SyncState::Synced => false,
            })
            .collect();

        if open.is_empty() {
            return Ok(ItemPush::Nothing);
        }

        for record in open.iter_mut().filter(|r| r.state == SyncState::Failed) {
            record.begin_retry(now)?;
        }

        let pushed = match self.inventory.find_by_id(item_id, household_id).await? {
            Some(item) => self.remote.upsert(std::slice::from_ref(&item)).await.map_err(|e| e.to_string()),
            None => Err(format!("item {item_id} missing locally")),
        };

        let settled = match pushed {
            Ok(()) => {
                for record in &mut open {
                    record.mark_synced(now)?;
                }
                ItemPush::Synced(open.len())
            }
            Err(error) => {
                warn!(item_id, error = %error, "Sync push failed");
                for record in &mut open {
                    record.mark_failed(error.clone(), now)?;
                }
                ItemPush::Failed(open.len())
            }
        };

        self.sync_state.upsert_metadata(&open).await?;
        Ok(settled)
    }
}
