//! # Inventory Service
//!
//! Local-first use cases over the store ports.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add / consume / move / update_dates / discard / archive               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate input ──► lock item id(s) ──► read ──► apply domain rule      │
//! │                                                      │                  │
//! │                                                      ▼                  │
//! │        InventoryStore::commit: item(s) + sync record(s) PENDING,       │
//! │        one transaction                                                  │
//! │                                                                         │
//! │  Connectivity is never consulted here. The push happens later in       │
//! │  sync_pending (drain.rs).                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operation Mapping
//! | Use case       | SyncOperation |
//! |----------------|---------------|
//! | add            | Add           |
//! | consume        | Consume       |
//! | move_item      | Update        |
//! | update_dates   | Update        |
//! | archive        | Delete        |
//! | discard        | Delete        |
//!
//! ## Lock Order
//! `add:{household}:{product}` before `item:{id}`. Adds, moves and date
//! changes take the product lock, so no two of them can leave two active
//! batches on one merge key.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use pantry_core::merge::{self, MergeDecision, MergeKey};
use pantry_core::ports::{
    Clock, Connectivity, InventoryStore, ItemWrite, LocationRemoval, LocationStore, RemoteGateway, SyncStateStore,
    SystemClock, WarmupRunStore,
};
use pantry_core::{
    fefo, new_id, validation, AddOutcome, CoreError, CoreResult, DateInfo, InventoryDraft, InventoryItem,
    ItemStatus, ProductSummary, Quantity, StorageLocation, SyncMetadata, SyncOperation, SyncState,
    ValidationError,
};
use pantry_db::Database;

use crate::config::{InventorySettings, PantryConfig, SyncSettings};
use crate::error::SyncResult;
use crate::locks::KeyedLocks;
use crate::retry::RetryPolicy;

// =============================================================================
// Stores
// =============================================================================

/// The local store ports a service runs on.
#[derive(Clone)]
pub struct Stores {
    pub inventory: Arc<dyn InventoryStore>,
    pub locations: Arc<dyn LocationStore>,
    pub sync_state: Arc<dyn SyncStateStore>,
    pub warmups: Arc<dyn WarmupRunStore>,
}

impl Stores {
    /// SQLite-backed stores sharing one pool.
    pub fn sqlite(db: &Database) -> Self {
        Stores {
            inventory: Arc::new(db.inventory()),
            locations: Arc::new(db.locations()),
            sync_state: Arc::new(db.sync_state()),
            warmups: Arc::new(db.warmups()),
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// What an add did.
#[derive(Debug, Clone, PartialEq)]
pub struct AddResult {
    pub item: InventoryItem,
    pub outcome: AddOutcome,
    /// The request id the add was recorded under.
    pub request_id: String,
    /// True if the request id was seen before and nothing was written.
    pub replayed: bool,
}

/// Sync indicator for one household.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub online: bool,
    pub pending: i64,
    pub failed: i64,
}

impl SyncStatus {
    pub fn has_unsynced(&self) -> bool {
        self.pending > 0 || self.failed > 0
    }
}

// =============================================================================
// Service
// =============================================================================

/// Entry point for every inventory use case.
///
/// Cloning is cheap; clones share stores, locks and the connectivity signal.
#[derive(Clone)]
pub struct InventoryService {
    pub(crate) inventory: Arc<dyn InventoryStore>,
    pub(crate) locations: Arc<dyn LocationStore>,
    pub(crate) sync_state: Arc<dyn SyncStateStore>,
    pub(crate) warmups: Arc<dyn WarmupRunStore>,
    pub(crate) remote: Arc<dyn RemoteGateway>,
    pub(crate) connectivity: Arc<dyn Connectivity>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) locks: Arc<KeyedLocks>,
    pub(crate) retry: RetryPolicy,
    pub(crate) sync_settings: SyncSettings,
    pub(crate) inventory_settings: InventorySettings,
}

impl InventoryService {
    pub fn new(
        stores: Stores,
        remote: Arc<dyn RemoteGateway>,
        connectivity: Arc<dyn Connectivity>,
        config: &PantryConfig,
    ) -> Self {
        InventoryService {
            inventory: stores.inventory,
            locations: stores.locations,
            sync_state: stores.sync_state,
            warmups: stores.warmups,
            remote,
            connectivity,
            clock: Arc::new(SystemClock),
            locks: Arc::new(KeyedLocks::new()),
            retry: RetryPolicy::from_settings(&config.sync),
            sync_settings: config.sync.clone(),
            inventory_settings: config.inventory.clone(),
        }
    }

    /// Replaces the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    // =========================================================================
    // Add
    // =========================================================================

    /// Records a newly observed batch, merging it into a matching active
    /// batch when one exists.
    ///
    /// Passing the same `request_id` again returns the first outcome and
    /// writes nothing. Without one, a fresh id is generated.
    pub async fn add(&self, draft: InventoryDraft, request_id: Option<String>) -> SyncResult<AddResult> {
        draft.validate()?;
        if let Some(request_id) = &request_id {
            validation::validate_id("request_id", request_id)?;
        }

        let household_id = draft.household_id.clone();
        let key = merge::key_for_draft(&draft);

        // Adds of one product are serialized so two of them cannot both
        // decide to create.
        let _add_guard = self.locks.lock(&add_lock_key(&key.household_id, &key.product_id)).await;

        if let Some(request_id) = &request_id {
            if let Some(previous) = self.replay_add(request_id, &household_id).await? {
                return Ok(previous);
            }
        }
        let request_id = request_id.unwrap_or_else(new_id);

        self.ensure_location(&draft.storage_location_id, &household_id).await?;

        let now = self.clock.now();
        let candidates = self.inventory.find_merge_candidates(&key).await?;
        let target_id = match merge::decide(&key, &candidates) {
            MergeDecision::Create => None,
            MergeDecision::Merge(target) => Some(target.id.clone()),
            MergeDecision::Collision { target, duplicates } => {
                let duplicate_ids: Vec<&str> = duplicates.iter().map(|d| d.id.as_str()).collect();
                warn!(
                    household_id = %key.household_id,
                    product_id = %key.product_id,
                    target_id = %target.id,
                    duplicates = ?duplicate_ids,
                    "merge_key_collision"
                );
                Some(target.id.clone())
            }
        };

        // Held until the commit below so a concurrent write to the target
        // cannot interleave.
        let _item_guard = match &target_id {
            Some(target_id) => Some(self.locks.lock(&item_lock_key(target_id)).await),
            None => None,
        };
        let merged = match &target_id {
            Some(target_id) => self.absorb_into(target_id, &key, &draft.quantity, now).await?,
            None => None,
        };
        let (item, outcome) = match merged {
            Some(item) => (item, AddOutcome::Merged),
            None => (InventoryItem::from_draft(new_id(), draft, now)?, AddOutcome::Created),
        };

        let record = match outcome {
            AddOutcome::Created => {
                SyncMetadata::pending(&item.id, &household_id, SyncOperation::Add, &request_id, now)
            }
            AddOutcome::Merged => {
                match self.sync_state.metadata(&item.id, &household_id, SyncOperation::Add).await? {
                    Some(mut existing) => {
                        existing.enqueue_again(now);
                        // The store keeps the first id on the record and
                        // files this one in its request ledger.
                        existing.idempotency_request_id = request_id.clone();
                        existing
                    }
                    None => SyncMetadata::pending(&item.id, &household_id, SyncOperation::Add, &request_id, now),
                }
            }
        }
        .with_outcome(outcome);

        let write = match outcome {
            AddOutcome::Created => ItemWrite::Create(&item),
            AddOutcome::Merged => ItemWrite::Update(&item),
        };
        self.inventory.commit(&[write], &[record]).await?;

        info!(
            item_id = %item.id,
            product_id = %item.product_id(),
            outcome = outcome.as_str(),
            quantity = %item.quantity,
            "Inventory item added"
        );

        Ok(AddResult {
            item,
            outcome,
            request_id,
            replayed: false,
        })
    }

    async fn replay_add(&self, request_id: &str, household_id: &str) -> SyncResult<Option<AddResult>> {
        let Some(previous) = self
            .sync_state
            .metadata_for_request(request_id, household_id, SyncOperation::Add)
            .await?
        else {
            return Ok(None);
        };

        let item = self
            .inventory
            .find_by_id(&previous.item_id, household_id)
            .await?
            .ok_or_else(|| CoreError::ItemNotFound(previous.item_id.clone()))?;

        debug!(request_id, item_id = %item.id, "Replayed add request");
        Ok(Some(AddResult {
            item,
            outcome: previous.add_outcome.unwrap_or(AddOutcome::Created),
            request_id: request_id.to_string(),
            replayed: true,
        }))
    }

    /// The target with `quantity` added, unsaved; `None` if it no longer
    /// matches `key`. Callers hold the target's item lock.
    async fn absorb_into(
        &self,
        target_id: &str,
        key: &MergeKey,
        quantity: &Quantity,
        now: DateTime<Utc>,
    ) -> SyncResult<Option<InventoryItem>> {
        let Some(mut target) = self.inventory.find_by_id(target_id, &key.household_id).await? else {
            return Ok(None);
        };
        if !merge::can_merge(&target, key) {
            debug!(item_id = %target_id, "Merge target changed before lock; creating instead");
            return Ok(None);
        }

        target.absorb(quantity, now)?;
        Ok(Some(target))
    }

    // =========================================================================
    // Consume
    // =========================================================================

    /// Takes `amount` of a product from its active batches, soonest expiry
    /// first. Every touched batch is written in one batch call.
    ///
    /// ## Errors
    /// - `InsufficientStock` if the active batches cannot cover `amount`
    /// - `IncompatibleUnit` if a batch is in another dimension
    pub async fn consume(
        &self,
        household_id: &str,
        product_id: &str,
        amount: Quantity,
    ) -> SyncResult<Vec<InventoryItem>> {
        validation::validate_id("household_id", household_id)?;
        validation::validate_id("product_id", product_id)?;
        validation::validate_quantity(&amount, false)?;

        let ids: Vec<String> = self
            .inventory
            .fetch_active_batches(product_id, household_id)
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect();
        let _guards = self.locks.lock_many(ids.iter().map(|id| item_lock_key(id))).await;

        // Re-read under the locks; batches added meanwhile are not ours.
        let batches: Vec<InventoryItem> = self
            .inventory
            .fetch_active_batches(product_id, household_id)
            .await?
            .into_iter()
            .filter(|b| ids.contains(&b.id))
            .collect();

        if batches.is_empty() {
            return Err(CoreError::InsufficientStock {
                product_id: product_id.to_string(),
                available: 0.0,
                requested: amount.value,
            }
            .into());
        }

        let plan = fefo::plan_consumption(&batches, &amount)?;
        let now = self.clock.now();

        let mut updated = Vec::with_capacity(plan.len());
        for allocation in &plan {
            let Some(batch) = batches.iter().find(|b| b.id == allocation.item_id) else {
                continue;
            };
            let mut batch = batch.clone();
            batch.take(&allocation.take, now)?;
            updated.push(batch);
        }

        let records = self
            .pending_records(household_id, updated.iter().map(|i| i.id.as_str()), SyncOperation::Consume, now)
            .await?;
        let writes: Vec<ItemWrite<'_>> = updated.iter().map(ItemWrite::Update).collect();
        self.inventory.commit(&writes, &records).await?;

        info!(
            household_id,
            product_id,
            amount = %amount,
            batches = updated.len(),
            "Consumed stock"
        );
        Ok(updated)
    }

    /// Takes `amount` from one specific batch.
    pub async fn consume_item(&self, item_id: &str, household_id: &str, amount: Quantity) -> SyncResult<InventoryItem> {
        validation::validate_quantity(&amount, false)?;
        self.mutate_item(item_id, household_id, SyncOperation::Consume, |item, now| {
            item.take(&amount, now).map(|_| ())
        })
        .await
    }

    // =========================================================================
    // Other Mutations
    // =========================================================================

    /// Moves a batch to another location of the same household.
    ///
    /// ## Errors
    /// - `MergeKeyTaken` if an identical active batch is already there
    pub async fn move_item(&self, item_id: &str, household_id: &str, location_id: &str) -> SyncResult<InventoryItem> {
        validation::validate_id("storage_location_id", location_id)?;
        self.ensure_location(location_id, household_id).await?;
        self.rekey_item(item_id, household_id, |item, now| item.move_to(location_id, now))
            .await
    }

    /// Replaces the expiry and opened dates of a batch.
    ///
    /// ## Errors
    /// - `MergeKeyTaken` if the new dates match another active batch
    pub async fn update_dates(
        &self,
        item_id: &str,
        household_id: &str,
        expiry: Option<DateInfo>,
        opened: Option<DateInfo>,
    ) -> SyncResult<InventoryItem> {
        self.rekey_item(item_id, household_id, |item, now| item.update_dates(expiry, opened, now))
            .await
    }

    /// Marks a batch as thrown away.
    pub async fn discard(&self, item_id: &str, household_id: &str) -> SyncResult<InventoryItem> {
        self.mutate_item(item_id, household_id, SyncOperation::Delete, |item, now| {
            item.transition(ItemStatus::Discarded, now)
        })
        .await
    }

    /// Hides a batch from active views without discarding it.
    pub async fn archive(&self, item_id: &str, household_id: &str) -> SyncResult<InventoryItem> {
        self.mutate_item(item_id, household_id, SyncOperation::Delete, |item, now| {
            item.transition(ItemStatus::Archived, now)
        })
        .await
    }

    /// An `Update` that may change the merge key, under the product lock.
    async fn rekey_item<F>(&self, item_id: &str, household_id: &str, apply: F) -> SyncResult<InventoryItem>
    where
        F: FnOnce(&mut InventoryItem, DateTime<Utc>) -> CoreResult<()> + Send,
    {
        validation::validate_id("item_id", item_id)?;
        validation::validate_id("household_id", household_id)?;

        // The product never changes, so this read only picks the lock.
        let product_id = self
            .inventory
            .find_by_id(item_id, household_id)
            .await?
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))?
            .product_id()
            .to_string();
        let _add_guard = self.locks.lock(&add_lock_key(household_id, &product_id)).await;

        self.mutate_item(item_id, household_id, SyncOperation::Update, apply).await
    }

    async fn mutate_item<F>(
        &self,
        item_id: &str,
        household_id: &str,
        operation: SyncOperation,
        apply: F,
    ) -> SyncResult<InventoryItem>
    where
        F: FnOnce(&mut InventoryItem, DateTime<Utc>) -> CoreResult<()> + Send,
    {
        validation::validate_id("item_id", item_id)?;
        validation::validate_id("household_id", household_id)?;

        let _guard = self.locks.lock(&item_lock_key(item_id)).await;

        let mut item = self
            .inventory
            .find_by_id(item_id, household_id)
            .await?
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))?;
        let key_before = merge::key_for(&item);

        let now = self.clock.now();
        apply(&mut item, now)?;

        if item.is_active() {
            let key = merge::key_for(&item);
            if key != key_before {
                self.ensure_key_free(&item, &key).await?;
            }
        }

        let records = self.pending_records(household_id, [item_id], operation, now).await?;
        self.inventory.commit(&[ItemWrite::Update(&item)], &records).await?;

        debug!(item_id, operation = operation.as_str(), status = %item.status, "Inventory item updated");
        Ok(item)
    }

    async fn ensure_key_free(&self, item: &InventoryItem, key: &MergeKey) -> SyncResult<()> {
        let holder = self
            .inventory
            .find_merge_candidates(key)
            .await?
            .into_iter()
            .find(|other| other.id != item.id);
        match holder {
            Some(holder) => Err(CoreError::MergeKeyTaken {
                item_id: item.id.clone(),
                existing_id: holder.id,
            }
            .into()),
            None => Ok(()),
        }
    }

    /// The `(item, operation)` records put back to pending, created with a
    /// fresh request id where missing. Nothing is written.
    async fn pending_records<'a>(
        &self,
        household_id: &str,
        item_ids: impl IntoIterator<Item = &'a str>,
        operation: SyncOperation,
        now: DateTime<Utc>,
    ) -> SyncResult<Vec<SyncMetadata>> {
        let mut records = Vec::new();
        for item_id in item_ids {
            let record = match self.sync_state.metadata(item_id, household_id, operation).await? {
                Some(mut existing) => {
                    existing.enqueue_again(now);
                    existing
                }
                None => SyncMetadata::pending(item_id, household_id, operation, new_id(), now),
            };
            records.push(record);
        }
        Ok(records)
    }

    // =========================================================================
    // Reads (local only)
    // =========================================================================

    pub async fn get_item(&self, item_id: &str, household_id: &str) -> SyncResult<Option<InventoryItem>> {
        Ok(self.inventory.find_by_id(item_id, household_id).await?)
    }

    /// False until the household records its first batch.
    pub async fn has_any_items(&self, household_id: &str) -> SyncResult<bool> {
        Ok(self.inventory.has_any_items(household_id).await?)
    }

    pub async fn count_active(&self, household_id: &str) -> SyncResult<i64> {
        Ok(self.inventory.count_active(household_id).await?)
    }

    pub async fn list_items(&self, household_id: &str, status: Option<ItemStatus>) -> SyncResult<Vec<InventoryItem>> {
        Ok(self.inventory.fetch_by_household(household_id, status).await?)
    }

    /// Active items whose expiry is before today in `tz`.
    pub async fn get_expired(
        &self,
        household_id: &str,
        as_of: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> SyncResult<Vec<InventoryItem>> {
        validation::validate_id("household_id", household_id)?;
        Ok(self.inventory.fetch_expired(household_id, as_of, tz).await?)
    }

    /// Active items expiring from today through `window_days` days later.
    ///
    /// `None` uses the configured default window.
    pub async fn get_expiring(
        &self,
        household_id: &str,
        as_of: DateTime<Utc>,
        window_days: Option<i64>,
        tz: &FixedOffset,
    ) -> SyncResult<Vec<InventoryItem>> {
        validation::validate_id("household_id", household_id)?;
        let window_days = self.window(window_days)?;
        Ok(self.inventory.fetch_expiring(household_id, as_of, window_days, tz).await?)
    }

    /// Every active item in consumption order.
    pub async fn get_active_sorted(
        &self,
        household_id: &str,
        as_of: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> SyncResult<Vec<InventoryItem>> {
        validation::validate_id("household_id", household_id)?;
        Ok(self
            .inventory
            .fetch_active_by_household_sorted_by_expiry(household_id, as_of, tz)
            .await?)
    }

    /// Aggregate of one product; zero counts if the household never stocked it.
    pub async fn summarize_by_product(&self, product_id: &str, household_id: &str) -> SyncResult<ProductSummary> {
        validation::validate_id("product_id", product_id)?;
        validation::validate_id("household_id", household_id)?;
        Ok(self.inventory.summarize_by_product(product_id, household_id).await?)
    }

    /// One summary per product the household ever stocked.
    pub async fn summarize_household(&self, household_id: &str) -> SyncResult<Vec<ProductSummary>> {
        validation::validate_id("household_id", household_id)?;
        Ok(self.inventory.summarize_household(household_id).await?)
    }

    pub async fn sync_status(&self, household_id: &str) -> SyncResult<SyncStatus> {
        Ok(SyncStatus {
            online: self.connectivity.is_online(),
            pending: self.sync_state.count_by_state(household_id, SyncState::Pending).await?,
            failed: self.sync_state.count_by_state(household_id, SyncState::Failed).await?,
        })
    }

    /// Resolves an optional window against the configured bounds.
    pub(crate) fn window(&self, window_days: Option<i64>) -> SyncResult<u32> {
        let days = window_days.unwrap_or(i64::from(self.inventory_settings.default_window_days));
        let days = validation::validate_window(days)?;
        if days > self.inventory_settings.max_window_days {
            return Err(ValidationError::InvalidWindow {
                days: i64::from(days),
                max: self.inventory_settings.max_window_days,
            }
            .into());
        }
        Ok(days)
    }

    // =========================================================================
    // Storage Locations
    // =========================================================================

    /// Creates a location with a generated id.
    pub async fn create_location(&self, household_id: &str, name: &str, is_cold: bool) -> SyncResult<StorageLocation> {
        let location = StorageLocation::new(new_id(), household_id, name, is_cold, self.clock.now())?;
        self.locations.save(&location).await?;
        info!(location_id = %location.id, name = %location.name, "Storage location created");
        Ok(location)
    }

    /// Saves a location built by the caller (fixed ids, imports).
    pub async fn save_location(&self, location: &StorageLocation) -> SyncResult<()> {
        validation::validate_id("id", &location.id)?;
        validation::validate_id("household_id", &location.household_id)?;
        validation::validate_location_name(&location.name)?;
        Ok(self.locations.save(location).await?)
    }

    pub async fn rename_location(&self, location_id: &str, household_id: &str, name: &str) -> SyncResult<StorageLocation> {
        validation::validate_location_name(name)?;
        let mut location = self
            .locations
            .find(location_id, household_id)
            .await?
            .ok_or_else(|| ValidationError::UnknownLocation(location_id.to_string()))?;

        location.name = name.trim().to_string();
        location.updated_at = self.clock.now();
        self.locations.save(&location).await?;
        Ok(location)
    }

    pub async fn list_locations(&self, household_id: &str) -> SyncResult<Vec<StorageLocation>> {
        Ok(self.locations.list(household_id).await?)
    }

    /// Deletes an empty location.
    ///
    /// ## Errors
    /// - `LocationInUse` while any item, of any status, references it
    /// - `UnknownLocation` if the household has no such location
    pub async fn delete_location(&self, location_id: &str, household_id: &str) -> SyncResult<()> {
        match self.locations.delete_if_unused(location_id, household_id).await? {
            LocationRemoval::Deleted => {
                info!(location_id, "Storage location deleted");
                Ok(())
            }
            LocationRemoval::InUse { items } => Err(ValidationError::LocationInUse {
                location_id: location_id.to_string(),
                items,
            }
            .into()),
            LocationRemoval::NotFound => Err(ValidationError::UnknownLocation(location_id.to_string()).into()),
        }
    }

    async fn ensure_location(&self, location_id: &str, household_id: &str) -> SyncResult<()> {
        match self.locations.find(location_id, household_id).await? {
            Some(_) => Ok(()),
            None => Err(ValidationError::UnknownLocation(location_id.to_string()).into()),
        }
    }
}

pub(crate) fn item_lock_key(item_id: &str) -> String {
    format!("item:{item_id}")
}

fn add_lock_key(household_id: &str, product_id: &str) -> String {
    format!("add:{household_id}:{product_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, ts, HOUSEHOLD, LOCATION};
    use pantry_core::{DateKind, Unit};

    fn draft(product: &str, pieces: f64) -> InventoryDraft {
        InventoryDraft::new(HOUSEHOLD, product, Quantity::pieces(pieces), LOCATION)
    }

    #[tokio::test]
    async fn test_identical_key_merges() {
        let h = harness().await;

        let first = h.service.add(draft("p1", 2.0), None).await.unwrap();
        let second = h.service.add(draft("p1", 1.0), None).await.unwrap();

        assert_eq!(first.outcome, AddOutcome::Created);
        assert_eq!(second.outcome, AddOutcome::Merged);
        assert!(h.service.has_any_items(HOUSEHOLD).await.unwrap());
        assert_eq!(h.service.count_active(HOUSEHOLD).await.unwrap(), 1);
        assert_eq!(second.item.id, first.item.id);

        let active = h.service.list_items(HOUSEHOLD, Some(ItemStatus::Active)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].quantity, Quantity::pieces(3.0));
    }

    #[tokio::test]
    async fn test_different_lot_creates() {
        let h = harness().await;

        h.service.add(draft("p1", 2.0).with_lot_code("A1"), None).await.unwrap();
        let other = h.service.add(draft("p1", 1.0).with_lot_code("B2"), None).await.unwrap();
        let same = h.service.add(draft("p1", 1.0).with_lot_code(" A1 "), None).await.unwrap();

        assert_eq!(other.outcome, AddOutcome::Created);
        assert_eq!(same.outcome, AddOutcome::Merged);
        assert_eq!(h.service.list_items(HOUSEHOLD, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_request_id_writes_once() {
        let h = harness().await;

        let first = h.service.add(draft("p1", 2.0), Some("req-1".into())).await.unwrap();
        let again = h.service.add(draft("p1", 2.0), Some("req-1".into())).await.unwrap();

        assert!(!first.replayed);
        assert!(again.replayed);
        assert_eq!(again.item.id, first.item.id);
        assert_eq!(again.outcome, AddOutcome::Created);
        assert_eq!(again.item.quantity, Quantity::pieces(2.0));
        assert_eq!(h.service.sync_status(HOUSEHOLD).await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_merged_request_replays_as_merged() {
        let h = harness().await;

        h.service.add(draft("p1", 2.0), Some("req-1".into())).await.unwrap();
        h.service.add(draft("p1", 1.0), Some("req-2".into())).await.unwrap();
        let replay = h.service.add(draft("p1", 1.0), Some("req-2".into())).await.unwrap();

        assert!(replay.replayed);
        assert_eq!(replay.outcome, AddOutcome::Merged);
        assert_eq!(replay.item.quantity, Quantity::pieces(3.0));

        let first = h.service.add(draft("p1", 2.0), Some("req-1".into())).await.unwrap();
        assert_eq!(first.outcome, AddOutcome::Created);
    }

    #[tokio::test]
    async fn test_unknown_location_rejected() {
        let h = harness().await;
        let err = h
            .service
            .add(InventoryDraft::new(HOUSEHOLD, "p1", Quantity::pieces(1.0), "garage"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::SyncError::Core(CoreError::Validation(ValidationError::UnknownLocation(_)))
        ));
    }

    #[tokio::test]
    async fn test_writes_enqueue_while_offline() {
        let h = harness().await;
        h.connectivity.set_online(false);

        let added = h.service.add(draft("p1", 2.0), None).await.unwrap();
        h.service.consume_item(&added.item.id, HOUSEHOLD, Quantity::pieces(1.0)).await.unwrap();

        let status = h.service.sync_status(HOUSEHOLD).await.unwrap();
        assert!(!status.online);
        assert_eq!(status.pending, 2);
        assert!(h.remote.pushes().await.is_empty());
    }

    #[tokio::test]
    async fn test_consume_follows_fefo() {
        let h = harness().await;

        let late = h.service.add(draft("milk", 2.0).with_expiry(ts(20)), None).await.unwrap();
        let soon = h.service.add(draft("milk", 1.0).with_expiry(ts(12)), None).await.unwrap();
        let undated = h.service.add(draft("milk", 5.0), None).await.unwrap();

        let touched = h.service.consume(HOUSEHOLD, "milk", Quantity::pieces(2.0)).await.unwrap();
        let ids: Vec<&str> = touched.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![soon.item.id.as_str(), late.item.id.as_str()]);

        assert_eq!(touched[0].status, ItemStatus::Consumed);
        assert_eq!(touched[1].quantity, Quantity::pieces(1.0));

        let untouched = h.service.get_item(&undated.item.id, HOUSEHOLD).await.unwrap().unwrap();
        assert_eq!(untouched.quantity, Quantity::pieces(5.0));
    }

    #[tokio::test]
    async fn test_consume_insufficient_stock_changes_nothing() {
        let h = harness().await;
        h.service.add(draft("milk", 1.0), None).await.unwrap();

        let err = h.service.consume(HOUSEHOLD, "milk", Quantity::pieces(3.0)).await.unwrap_err();
        assert!(matches!(err, crate::SyncError::Core(CoreError::InsufficientStock { .. })));

        let err = h.service.consume(HOUSEHOLD, "eggs", Quantity::pieces(1.0)).await.unwrap_err();
        assert!(matches!(
            err,
            crate::SyncError::Core(CoreError::InsufficientStock { ref product_id, .. }) if product_id == "eggs"
        ));

        let summary = h.service.summarize_by_product("milk", HOUSEHOLD).await.unwrap();
        assert_eq!(summary.total_quantity, 1.0);
        assert_eq!(h.service.summarize_by_product("eggs", HOUSEHOLD).await.unwrap().batch_count, 0);
    }

    #[tokio::test]
    async fn test_consume_converts_units() {
        let h = harness().await;
        let flour = InventoryDraft::new(HOUSEHOLD, "flour", Quantity::new(1.0, Unit::Kilogram).unwrap(), LOCATION);
        h.service.add(flour, None).await.unwrap();

        let touched = h
            .service
            .consume(HOUSEHOLD, "flour", Quantity::new(250.0, Unit::Gram).unwrap())
            .await
            .unwrap();
        assert!((touched[0].quantity.value - 0.75).abs() < 1e-9);

        let err = h
            .service
            .consume(HOUSEHOLD, "flour", Quantity::new(1.0, Unit::Liter).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::SyncError::Core(CoreError::IncompatibleUnit { .. })));
    }

    #[tokio::test]
    async fn test_other_household_sees_nothing() {
        let h = harness().await;
        let added = h.service.add(draft("p1", 1.0), None).await.unwrap();

        assert!(h.service.get_item(&added.item.id, "h2").await.unwrap().is_none());
        let err = h.service.discard(&added.item.id, "h2").await.unwrap_err();
        assert!(matches!(err, crate::SyncError::Core(CoreError::ItemNotFound(_))));
    }

    #[tokio::test]
    async fn test_move_onto_identical_batch_is_refused() {
        let h = harness().await;
        let shelf = h.service.create_location(HOUSEHOLD, "Shelf", false).await.unwrap();

        let a = h.service.add(draft("p1", 1.0), None).await.unwrap();
        let mut at_shelf = draft("p1", 2.0);
        at_shelf.storage_location_id = shelf.id.clone();
        let b = h.service.add(at_shelf, None).await.unwrap();

        let err = h.service.move_item(&a.item.id, HOUSEHOLD, &shelf.id).await.unwrap_err();
        assert!(matches!(
            err,
            crate::SyncError::Core(CoreError::MergeKeyTaken { ref existing_id, .. }) if *existing_id == b.item.id
        ));

        let key = merge::key_for(&b.item);
        assert_eq!(h.db.inventory().find_merge_candidates(&key).await.unwrap().len(), 1);
        let unmoved = h.service.get_item(&a.item.id, HOUSEHOLD).await.unwrap().unwrap();
        assert_eq!(unmoved.storage_location_id, LOCATION);

        // A batch with its own lot can move there.
        let c = h.service.add(draft("p1", 1.0).with_lot_code("L7"), None).await.unwrap();
        let moved = h.service.move_item(&c.item.id, HOUSEHOLD, &shelf.id).await.unwrap();
        assert_eq!(moved.storage_location_id, shelf.id);

        let err = h.service.move_item(&a.item.id, HOUSEHOLD, "garage").await.unwrap_err();
        assert!(err.is_domain_error());
    }

    #[tokio::test]
    async fn test_date_change_onto_identical_batch_is_refused() {
        let h = harness().await;
        let dated = h.service.add(draft("p1", 1.0).with_expiry(ts(15)), None).await.unwrap();
        let undated = h.service.add(draft("p1", 1.0), None).await.unwrap();
        assert_eq!(undated.outcome, AddOutcome::Created);

        let expiry = DateInfo::manual(DateKind::BestBefore, ts(15));
        let err = h
            .service
            .update_dates(&undated.item.id, HOUSEHOLD, Some(expiry), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::SyncError::Core(CoreError::MergeKeyTaken { ref existing_id, .. }) if *existing_id == dated.item.id
        ));
        assert_eq!(h.service.count_active(HOUSEHOLD).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_add_commit_leaves_no_trace() {
        let h = harness().await;
        h.service.add(draft("p1", 2.0), Some("req-1".into())).await.unwrap();

        sqlx::query(
            r#"
            CREATE TRIGGER fail_request_ledger BEFORE INSERT ON sync_requests
            WHEN NEW.request_id = 'req-2'
            BEGIN SELECT RAISE(ABORT, 'disk'); END
            "#,
        )
        .execute(h.db.pool())
        .await
        .unwrap();

        assert!(h.service.add(draft("p1", 1.0), Some("req-2".into())).await.is_err());
        let active = h.service.list_items(HOUSEHOLD, Some(ItemStatus::Active)).await.unwrap();
        assert_eq!(active[0].quantity, Quantity::pieces(2.0));

        sqlx::query("DROP TRIGGER fail_request_ledger")
            .execute(h.db.pool())
            .await
            .unwrap();

        let retried = h.service.add(draft("p1", 1.0), Some("req-2".into())).await.unwrap();
        assert!(!retried.replayed);
        assert_eq!(retried.item.quantity, Quantity::pieces(3.0));

        let again = h.service.add(draft("p1", 1.0), Some("req-2".into())).await.unwrap();
        assert!(again.replayed);
        assert_eq!(again.item.quantity, Quantity::pieces(3.0));
    }

    #[tokio::test]
    async fn test_concurrent_identical_adds_share_one_batch() {
        let h = harness().await;

        let (first, second) = tokio::join!(
            h.service.add(draft("p1", 2.0), None),
            h.service.add(draft("p1", 3.0), None)
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.item.id, second.item.id);

        let active = h.service.list_items(HOUSEHOLD, Some(ItemStatus::Active)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].quantity, Quantity::pieces(5.0));
    }

    #[tokio::test]
    async fn test_double_tap_with_one_request_id_writes_once() {
        let h = harness().await;
        h.connectivity.set_online(false);

        let (first, second) = tokio::join!(
            h.service.add(draft("p1", 2.0), Some("tap".into())),
            h.service.add(draft("p1", 2.0), Some("tap".into()))
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.item.id, second.item.id);
        assert!(first.replayed != second.replayed);

        let active = h.service.list_items(HOUSEHOLD, Some(ItemStatus::Active)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].quantity, Quantity::pieces(2.0));
        assert_eq!(h.service.sync_status(HOUSEHOLD).await.unwrap().pending, 1);

        h.connectivity.set_online(true);
        h.service.sync_pending(HOUSEHOLD).await.unwrap();
        assert_eq!(h.remote.pushes().await.len(), 1);
    }

    #[tokio::test]
    async fn test_discard_and_archive_record_delete() {
        let h = harness().await;
        let kept = h.service.add(draft("p1", 1.0), None).await.unwrap();
        let thrown = h.service.add(draft("p2", 1.0), None).await.unwrap();

        h.service.archive(&kept.item.id, HOUSEHOLD).await.unwrap();
        h.service.discard(&thrown.item.id, HOUSEHOLD).await.unwrap();

        let sync = h.db.sync_state();
        for id in [&kept.item.id, &thrown.item.id] {
            assert!(sync.metadata(id, HOUSEHOLD, SyncOperation::Delete).await.unwrap().is_some());
            assert!(sync.metadata(id, HOUSEHOLD, SyncOperation::Update).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_terminal_items_reject_mutations() {
        let h = harness().await;
        let added = h.service.add(draft("p1", 1.0), None).await.unwrap();

        let discarded = h.service.discard(&added.item.id, HOUSEHOLD).await.unwrap();
        assert_eq!(discarded.status, ItemStatus::Discarded);

        let err = h.service.archive(&added.item.id, HOUSEHOLD).await.unwrap_err();
        assert!(matches!(err, crate::SyncError::Core(CoreError::InvalidStatusTransition { .. })));

        let again = h.service.add(draft("p1", 1.0), None).await.unwrap();
        assert_eq!(again.outcome, AddOutcome::Created);
    }

    #[tokio::test]
    async fn test_update_dates_validates_confidence() {
        let h = harness().await;
        let added = h.service.add(draft("p1", 1.0), None).await.unwrap();

        let mut expiry = DateInfo::manual(DateKind::BestBefore, ts(15));
        let updated = h
            .service
            .update_dates(&added.item.id, HOUSEHOLD, Some(expiry.clone()), None)
            .await
            .unwrap();
        assert_eq!(updated.expiry_date(), Some(ts(15)));

        expiry.confidence = 1.5;
        let err = h
            .service
            .update_dates(&added.item.id, HOUSEHOLD, Some(expiry), None)
            .await
            .unwrap_err();
        assert!(err.is_domain_error());
    }

    #[tokio::test]
    async fn test_window_bounds() {
        let h = harness().await;
        let tz = FixedOffset::east_opt(0).unwrap();

        assert!(h.service.get_expiring(HOUSEHOLD, ts(10), None, &tz).await.is_ok());
        assert!(h.service.get_expiring(HOUSEHOLD, ts(10), Some(-1), &tz).await.is_err());
        assert!(h.service.get_expiring(HOUSEHOLD, ts(10), Some(366), &tz).await.is_err());
    }

    #[tokio::test]
    async fn test_location_lifecycle() {
        let h = harness().await;
        let shelf = h.service.create_location(HOUSEHOLD, "  Shelf ", false).await.unwrap();
        assert_eq!(shelf.name, "Shelf");

        let renamed = h.service.rename_location(&shelf.id, HOUSEHOLD, "Top shelf").await.unwrap();
        assert_eq!(renamed.name, "Top shelf");

        h.service.delete_location(LOCATION, HOUSEHOLD).await.unwrap();

        let mut on_shelf = draft("p1", 1.0);
        on_shelf.storage_location_id = shelf.id.clone();
        h.service.add(on_shelf, None).await.unwrap();

        let err = h.service.delete_location(&shelf.id, HOUSEHOLD).await.unwrap_err();
        assert!(matches!(
            err,
            crate::SyncError::Core(CoreError::Validation(ValidationError::LocationInUse { items: 1, .. }))
        ));
        assert!(h.service.delete_location("nowhere", HOUSEHOLD).await.is_err());
    }
}
