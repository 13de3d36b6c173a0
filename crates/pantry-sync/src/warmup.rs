//! Once-per-launch scan of the expiring window.
//!
//! The first call for a `(launch, household, window)` claims a marker and
//! runs the scan; later calls in the same launch return at once. A failed
//! scan releases the marker so the next call can try again.

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info, warn};

use pantry_core::{validation, InventoryItem, WarmupKey, WarmupRun};

use crate::error::SyncResult;
use crate::service::InventoryService;

#[derive(Debug, Clone, PartialEq)]
pub enum WarmupOutcome {
    /// This call ran the scan.
    Warmed { items: Vec<InventoryItem> },
    /// Another call already claimed this launch.
    AlreadyWarmed,
}

impl WarmupOutcome {
    pub fn items(&self) -> &[InventoryItem] {
        match self {
            WarmupOutcome::Warmed { items } => items,
            WarmupOutcome::AlreadyWarmed => &[],
        }
    }
}

impl InventoryService {
    pub async fn warm_expiring_window(
        &self,
        launch_id: &str,
        household_id: &str,
        window_days: i64,
        as_of: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> SyncResult<WarmupOutcome> {
        validation::validate_id("launch_id", launch_id)?;
        validation::validate_id("household_id", household_id)?;
        let key = WarmupKey {
            launch_id: launch_id.to_string(),
            household_id: household_id.to_string(),
            window_days: self.window(Some(window_days))?,
        };

        if self.warmups.has_run(&key).await? {
            return Ok(WarmupOutcome::AlreadyWarmed);
        }
        if !self.warmups.try_claim(&WarmupRun::claim(&key, self.clock.now())).await? {
            debug!(launch_id, household_id, "Warm-up claimed concurrently");
            return Ok(WarmupOutcome::AlreadyWarmed);
        }

        let items = match self
            .inventory
            .fetch_expiring(household_id, as_of, key.window_days, tz)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                warn!(launch_id, household_id, error = %e, "Warm-up scan failed; releasing claim");
                self.warmups.release(&key).await?;
                return Err(e.into());
            }
        };

        self.warmups.finish(&key, items.len() as u64).await?;
        info!(launch_id, household_id, window_days = key.window_days, items = items.len(), "Expiring window warmed");
        Ok(WarmupOutcome::Warmed { items })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use pantry_core::merge::MergeKey;
    use pantry_core::ports::{InventoryStore, ItemWrite};
    use pantry_core::{
        InventoryDraft, ItemStatus, ProductSummary, Quantity, RepositoryError, RepositoryResult, SyncMetadata,
    };

    use crate::config::PantryConfig;
    use crate::connectivity::ConnectivityMonitor;
    use crate::remote::LoopbackRemote;
    use crate::service::Stores;
    use crate::testing::{harness, ts, HOUSEHOLD, LOCATION};

    use super::*;

    /// Counts expiring scans and can be told to fail them.
    struct CountingStore {
        inner: Arc<dyn InventoryStore>,
        scans: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl InventoryStore for CountingStore {
        async fn create(&self, item: &InventoryItem) -> RepositoryResult<()> {
            self.inner.create(item).await
        }
        async fn upsert(&self, item: &InventoryItem) -> RepositoryResult<()> {
            self.inner.upsert(item).await
        }
        async fn commit(&self, writes: &[ItemWrite<'_>], records: &[SyncMetadata]) -> RepositoryResult<()> {
            self.inner.commit(writes, records).await
        }
        async fn has_any_items(&self, household_id: &str) -> RepositoryResult<bool> {
            self.inner.has_any_items(household_id).await
        }
        async fn find_by_id(&self, id: &str, household_id: &str) -> RepositoryResult<Option<InventoryItem>> {
            self.inner.find_by_id(id, household_id).await
        }
        async fn find_merge_candidates(&self, key: &MergeKey) -> RepositoryResult<Vec<InventoryItem>> {
            self.inner.find_merge_candidates(key).await
        }
        async fn fetch_active_batches(
            &self,
            product_id: &str,
            household_id: &str,
        ) -> RepositoryResult<Vec<InventoryItem>> {
            self.inner.fetch_active_batches(product_id, household_id).await
        }
        async fn fetch_active_by_household_sorted_by_expiry(
            &self,
            household_id: &str,
            as_of: DateTime<Utc>,
            tz: &FixedOffset,
        ) -> RepositoryResult<Vec<InventoryItem>> {
            self.inner
                .fetch_active_by_household_sorted_by_expiry(household_id, as_of, tz)
                .await
        }
        async fn fetch_expired(
            &self,
            household_id: &str,
            as_of: DateTime<Utc>,
            tz: &FixedOffset,
        ) -> RepositoryResult<Vec<InventoryItem>> {
            self.inner.fetch_expired(household_id, as_of, tz).await
        }
        async fn fetch_expiring(
            &self,
            household_id: &str,
            as_of: DateTime<Utc>,
            window_days: u32,
            tz: &FixedOffset,
        ) -> RepositoryResult<Vec<InventoryItem>> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RepositoryError::Unavailable("disk busy".into()));
            }
            self.inner.fetch_expiring(household_id, as_of, window_days, tz).await
        }
        async fn summarize_by_product(
            &self,
            product_id: &str,
            household_id: &str,
        ) -> RepositoryResult<ProductSummary> {
            self.inner.summarize_by_product(product_id, household_id).await
        }
        async fn summarize_household(&self, household_id: &str) -> RepositoryResult<Vec<ProductSummary>> {
            self.inner.summarize_household(household_id).await
        }
        async fn fetch_by_household(
            &self,
            household_id: &str,
            status: Option<ItemStatus>,
        ) -> RepositoryResult<Vec<InventoryItem>> {
            self.inner.fetch_by_household(household_id, status).await
        }
        async fn count_active(&self, household_id: &str) -> RepositoryResult<i64> {
            self.inner.count_active(household_id).await
        }
    }

    async fn counting_service() -> (crate::testing::Harness, Arc<CountingStore>, InventoryService) {
        let h = harness().await;
        let store = Arc::new(CountingStore {
            inner: Arc::new(h.db.inventory()),
            scans: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        });
        let mut stores = Stores::sqlite(&h.db);
        stores.inventory = store.clone();
        let service = InventoryService::new(
            stores,
            Arc::new(LoopbackRemote::new()),
            Arc::new(ConnectivityMonitor::new(true)),
            &PantryConfig::default(),
        )
        .with_clock(h.clock.clone());
        (h, store, service)
    }

    #[tokio::test]
    async fn test_second_warmup_does_not_scan() {
        let (h, store, service) = counting_service().await;
        let tz = FixedOffset::east_opt(0).unwrap();
        let soon = InventoryDraft::new(HOUSEHOLD, "milk", Quantity::pieces(1.0), LOCATION).with_expiry(ts(11));
        service.add(soon, None).await.unwrap();

        let first = service.warm_expiring_window("launch-1", HOUSEHOLD, 3, ts(10), &tz).await.unwrap();
        assert_eq!(first.items().len(), 1);

        let second = service.warm_expiring_window("launch-1", HOUSEHOLD, 3, ts(10), &tz).await.unwrap();
        assert_eq!(second, WarmupOutcome::AlreadyWarmed);
        assert_eq!(store.scans.load(Ordering::SeqCst), 1);

        let key = WarmupKey {
            launch_id: "launch-1".into(),
            household_id: HOUSEHOLD.into(),
            window_days: 3,
        };
        assert_eq!(h.db.warmups().item_count(&key).await.unwrap(), Some(1));

        // A new launch or window scans again.
        service.warm_expiring_window("launch-2", HOUSEHOLD, 3, ts(10), &tz).await.unwrap();
        service.warm_expiring_window("launch-1", HOUSEHOLD, 7, ts(10), &tz).await.unwrap();
        assert_eq!(store.scans.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_scan_releases_claim() {
        let (_h, store, service) = counting_service().await;
        let tz = FixedOffset::east_opt(0).unwrap();

        store.fail.store(true, Ordering::SeqCst);
        assert!(service.warm_expiring_window("launch-1", HOUSEHOLD, 3, ts(10), &tz).await.is_err());

        store.fail.store(false, Ordering::SeqCst);
        let retried = service.warm_expiring_window("launch-1", HOUSEHOLD, 3, ts(10), &tz).await.unwrap();
        assert!(matches!(retried, WarmupOutcome::Warmed { .. }));
        assert_eq!(store.scans.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_window_is_validated() {
        let h = harness().await;
        let tz = FixedOffset::east_opt(0).unwrap();
        assert!(h.service.warm_expiring_window("launch-1", HOUSEHOLD, -2, ts(10), &tz).await.is_err());
        assert!(h.service.warm_expiring_window("launch-1", HOUSEHOLD, 400, ts(10), &tz).await.is_err());
    }
}
