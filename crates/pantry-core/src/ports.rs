//! # Ports
//!
//! Trait seams between the pure core and its adapters.
//!
//! ```text
//! ┌───────────────────────────┐      ┌───────────────────────────┐
//! │  pantry-sync (use cases)  │─────►│  ports (this module)      │
//! └───────────────────────────┘      │  InventoryStore           │
//!                                    │  LocationStore            │
//!                                    │  SyncStateStore           │
//!                                    │  WarmupRunStore           │
//!                                    │  RemoteGateway            │
//!                                    │  Connectivity, Clock      │
//!                                    └─────────────┬─────────────┘
//!                                                  │ implemented by
//!                        ┌─────────────────────────┴───────────────┐
//!                        │ pantry-db (SQLite)   pantry-sync (loopback,
//!                        │                      watch-based monitor) │
//!                        └─────────────────────────────────────────┘
//! ```
//!
//! Every store call scoped by `household_id` returns `None` or an empty list
//! for data owned by another household; it never errors on that account.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};

use crate::error::{RemoteResult, RepositoryResult};
use crate::merge::{self, MergeDecision, MergeKey};
use crate::summary::ProductSummary;
use crate::sync_meta::{SyncMetadata, SyncOperation, SyncState, WarmupKey, WarmupRun};
use crate::types::{InventoryItem, ItemStatus, StorageLocation};

/// One item write inside [`InventoryStore::commit`].
#[derive(Debug, Clone, Copy)]
pub enum ItemWrite<'a> {
    /// Insert; fails if the id exists.
    Create(&'a InventoryItem),
    /// Guarded replace of an existing item.
    Update(&'a InventoryItem),
}

impl<'a> ItemWrite<'a> {
    pub fn item(&self) -> &'a InventoryItem {
        match self {
            ItemWrite::Create(item) | ItemWrite::Update(item) => item,
        }
    }
}

/// Result of [`LocationStore::delete_if_unused`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationRemoval {
    Deleted,
    /// Items of any status still reference the location.
    InUse { items: i64 },
    NotFound,
}

/// Local inventory persistence.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Inserts a new item. Fails if the id exists.
    async fn create(&self, item: &InventoryItem) -> RepositoryResult<()>;

    /// Inserts or replaces an item by id.
    ///
    /// Used for remote pulls; the merge-key check of [`commit`](Self::commit)
    /// does not apply, so a duplicate made on another device lands as-is.
    async fn upsert(&self, item: &InventoryItem) -> RepositoryResult<()>;

    /// Applies item writes and their sync records in one transaction.
    ///
    /// Fails with [`RepositoryError::Constraint`](crate::RepositoryError::Constraint)
    /// and writes nothing if an active item would share its merge key with
    /// another active item, or would reference a location the household
    /// does not have.
    async fn commit(&self, writes: &[ItemWrite<'_>], records: &[SyncMetadata]) -> RepositoryResult<()>;

    async fn has_any_items(&self, household_id: &str) -> RepositoryResult<bool>;

    async fn find_by_id(&self, id: &str, household_id: &str) -> RepositoryResult<Option<InventoryItem>>;

    /// Active items sharing `key`, earliest-created first.
    async fn find_merge_candidates(&self, key: &MergeKey) -> RepositoryResult<Vec<InventoryItem>>;

    /// The item a new observation with `key` would merge into.
    async fn find_merge_candidate(&self, key: &MergeKey) -> RepositoryResult<Option<InventoryItem>> {
        let candidates = self.find_merge_candidates(key).await?;
        Ok(match merge::decide(key, &candidates) {
            MergeDecision::Create => None,
            MergeDecision::Merge(item) => Some(item.clone()),
            MergeDecision::Collision { target, .. } => Some(target.clone()),
        })
    }

    /// Active batches of a product by ascending `created_at`.
    async fn fetch_active_batches(
        &self,
        product_id: &str,
        household_id: &str,
    ) -> RepositoryResult<Vec<InventoryItem>>;

    /// Every active item of the household in FEFO order.
    async fn fetch_active_by_household_sorted_by_expiry(
        &self,
        household_id: &str,
        as_of: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> RepositoryResult<Vec<InventoryItem>>;

    /// Active items whose resolved expiry is before the start of today.
    async fn fetch_expired(
        &self,
        household_id: &str,
        as_of: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> RepositoryResult<Vec<InventoryItem>>;

    /// Active items expiring within `[start_of_today, start_of_today + window_days]`.
    async fn fetch_expiring(
        &self,
        household_id: &str,
        as_of: DateTime<Utc>,
        window_days: u32,
        tz: &FixedOffset,
    ) -> RepositoryResult<Vec<InventoryItem>>;

    /// Aggregate of one product's batches; zero counts if it was never stocked.
    async fn summarize_by_product(&self, product_id: &str, household_id: &str) -> RepositoryResult<ProductSummary>;

    /// One summary per product the household ever stocked, by product id.
    async fn summarize_household(&self, household_id: &str) -> RepositoryResult<Vec<ProductSummary>>;

    /// Items of the household, optionally filtered by status.
    async fn fetch_by_household(
        &self,
        household_id: &str,
        status: Option<ItemStatus>,
    ) -> RepositoryResult<Vec<InventoryItem>>;

    async fn count_active(&self, household_id: &str) -> RepositoryResult<i64>;
}

/// Storage location persistence.
#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn save(&self, location: &StorageLocation) -> RepositoryResult<()>;

    async fn find(&self, id: &str, household_id: &str) -> RepositoryResult<Option<StorageLocation>>;

    async fn list(&self, household_id: &str) -> RepositoryResult<Vec<StorageLocation>>;

    /// Items of any status that reference the location.
    async fn count_items_at(&self, id: &str, household_id: &str) -> RepositoryResult<i64>;

    /// Deletes the location only if no item references it, checked and
    /// deleted in one statement.
    async fn delete_if_unused(&self, id: &str, household_id: &str) -> RepositoryResult<LocationRemoval>;
}

/// Per-mutation sync bookkeeping.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Writes every record or none of them.
    async fn upsert_metadata(&self, records: &[SyncMetadata]) -> RepositoryResult<()>;

    /// Records in `state`, never-attempted first, then oldest attempt.
    async fn fetch_by_state(
        &self,
        household_id: &str,
        state: SyncState,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<SyncMetadata>>;

    /// Failed records with `retry_count < max_attempts` (`0` means no cap),
    /// in the same order as [`fetch_by_state`](Self::fetch_by_state).
    ///
    /// Exhausted records are filtered before the limit so they cannot crowd
    /// out records that may still be retried.
    async fn fetch_retryable(
        &self,
        household_id: &str,
        max_attempts: u32,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<SyncMetadata>>;

    /// Failed records that used up `max_attempts`; always 0 when uncapped.
    async fn count_exhausted(&self, household_id: &str, max_attempts: u32) -> RepositoryResult<i64>;

    async fn metadata(
        &self,
        item_id: &str,
        household_id: &str,
        operation: SyncOperation,
    ) -> RepositoryResult<Option<SyncMetadata>>;

    async fn metadata_for_request(
        &self,
        request_id: &str,
        household_id: &str,
        operation: SyncOperation,
    ) -> RepositoryResult<Option<SyncMetadata>>;

    /// Every record of one item, across operations.
    async fn fetch_for_item(&self, item_id: &str, household_id: &str) -> RepositoryResult<Vec<SyncMetadata>>;

    async fn count_by_state(&self, household_id: &str, state: SyncState) -> RepositoryResult<i64>;
}

/// Once-per-launch warm-up markers.
#[async_trait]
pub trait WarmupRunStore: Send + Sync {
    /// Inserts the marker if absent. Returns true if this call claimed it.
    async fn try_claim(&self, run: &WarmupRun) -> RepositoryResult<bool>;

    async fn has_run(&self, key: &WarmupKey) -> RepositoryResult<bool>;

    /// Drops a claimed marker so a failed warm-up can run again.
    async fn release(&self, key: &WarmupKey) -> RepositoryResult<()>;

    async fn finish(&self, key: &WarmupKey, item_count: u64) -> RepositoryResult<()>;
}

/// The remote inventory backend.
///
/// `upsert` is whole-item, last-writer-wins and idempotent: pushing the same
/// snapshot twice is harmless.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn upsert(&self, items: &[InventoryItem]) -> RemoteResult<()>;

    async fn fetch_active_items(&self, household_id: &str) -> RemoteResult<Vec<InventoryItem>>;
}

/// Reports whether the remote is reachable right now.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Source of "now" for use cases.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
