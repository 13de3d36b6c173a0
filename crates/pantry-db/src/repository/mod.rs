//! # Repository Module
//!
//! SQLite implementations of the store ports.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  InventoryService (pantry-sync)                                        │
//! │       │                                                                 │
//! │       │  Arc<dyn InventoryStore>                                        │
//! │       ▼                                                                 │
//! │  InventoryRepository                                                   │
//! │  ├── inherent methods returning DbResult (usable directly)             │
//! │  └── impl InventoryStore (maps DbError → RepositoryError)              │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`InventoryRepository`](inventory::InventoryRepository) - Batches, merge candidates, expiry views
//! - [`LocationRepository`](location::LocationRepository) - Storage locations
//! - [`SyncStateRepository`](sync_state::SyncStateRepository) - Sync metadata and request ledger
//! - [`WarmupRepository`](warmup::WarmupRepository) - Once-per-launch warm-up markers

pub mod inventory;
pub mod location;
pub mod sync_state;
pub mod warmup;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{DbError, DbResult};

/// Unix milliseconds, the on-disk timestamp format.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn opt_millis(at: Option<DateTime<Utc>>) -> Option<i64> {
    at.map(to_millis)
}

pub(crate) fn from_millis(entity: &str, id: &str, millis: i64) -> DbResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| DbError::decode(entity, id, format!("timestamp out of range: {millis}")))
}

pub(crate) fn from_opt_millis(entity: &str, id: &str, millis: Option<i64>) -> DbResult<Option<DateTime<Utc>>> {
    millis.map(|m| from_millis(entity, id, m)).transpose()
}
