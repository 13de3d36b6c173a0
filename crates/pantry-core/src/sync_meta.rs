//! # Sync Metadata
//!
//! Per-mutation bookkeeping for propagating local writes to the remote.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 One record per (item_id, household_id, operation)       │
//! │                                                                         │
//! │                 mark_synced()                                           │
//! │     ┌─────────┐ ─────────────────► ┌────────┐                           │
//! │     │ PENDING │                    │ SYNCED │                           │
//! │     └─────────┘ ◄───────────────── └────────┘                           │
//! │       │    ▲      new local mutation                                    │
//! │       │    │      (fresh cycle, retry_count reset)                      │
//! │       │    │                                                            │
//! │       │    │ begin_retry()                                              │
//! │       ▼    │                                                            │
//! │     ┌────────┐                                                          │
//! │     │ FAILED │   mark_failed(): retry_count += 1, last_error set        │
//! │     └────────┘                                                          │
//! │                                                                         │
//! │  idempotency_request_id is fixed the first time the key is written.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Operation / State / Outcome
// =============================================================================

/// The kind of local mutation a record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Add,
    Update,
    Delete,
    Consume,
}

impl SyncOperation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Add => "add",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
            SyncOperation::Consume => "consume",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOperation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(SyncOperation::Add),
            "update" => Ok(SyncOperation::Update),
            "delete" => Ok(SyncOperation::Delete),
            "consume" => Ok(SyncOperation::Consume),
            _ => Err(not_allowed("operation", &["add", "update", "delete", "consume"])),
        }
    }
}

/// Propagation state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    Synced,
    Failed,
}

impl SyncState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncState::Pending),
            "synced" => Ok(SyncState::Synced),
            "failed" => Ok(SyncState::Failed),
            _ => Err(not_allowed("state", &["pending", "synced", "failed"])),
        }
    }
}

/// Whether an add merged into an existing batch or created a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Merged,
    Created,
}

impl AddOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AddOutcome::Merged => "merged",
            AddOutcome::Created => "created",
        }
    }
}

impl FromStr for AddOutcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merged" => Ok(AddOutcome::Merged),
            "created" => Ok(AddOutcome::Created),
            _ => Err(not_allowed("add_outcome", &["merged", "created"])),
        }
    }
}

fn not_allowed(field: &str, allowed: &[&str]) -> ValidationError {
    ValidationError::NotAllowed {
        field: field.to_string(),
        allowed: allowed.iter().map(|s| s.to_string()).collect(),
    }
}

// =============================================================================
// Sync Metadata
// =============================================================================

/// Unique key of a sync metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncMetadataKey {
    pub item_id: String,
    pub household_id: String,
    pub operation: SyncOperation,
}

/// Tracks whether one local mutation kind for one item reached the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncMetadata {
    pub item_id: String,
    pub household_id: String,
    pub operation: SyncOperation,
    pub state: SyncState,

    /// Failed attempts so far in the current cycle.
    pub retry_count: u32,

    pub last_error: Option<String>,

    #[ts(as = "Option<String>")]
    pub last_attempt_at: Option<DateTime<Utc>>,

    #[ts(as = "Option<String>")]
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Client-generated, stable across retries of the same logical mutation.
    pub idempotency_request_id: String,

    /// Only set for `add` records.
    pub add_outcome: Option<AddOutcome>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl SyncMetadata {
    /// A fresh pending record.
    pub fn pending(
        item_id: impl Into<String>,
        household_id: impl Into<String>,
        operation: SyncOperation,
        idempotency_request_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        SyncMetadata {
            item_id: item_id.into(),
            household_id: household_id.into(),
            operation,
            state: SyncState::Pending,
            retry_count: 0,
            last_error: None,
            last_attempt_at: None,
            last_synced_at: None,
            idempotency_request_id: idempotency_request_id.into(),
            add_outcome: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the add outcome tag.
    pub fn with_outcome(mut self, outcome: AddOutcome) -> Self {
        if self.operation == SyncOperation::Add {
            self.add_outcome = Some(outcome);
        }
        self
    }

    pub fn key(&self) -> SyncMetadataKey {
        SyncMetadataKey {
            item_id: self.item_id.clone(),
            household_id: self.household_id.clone(),
            operation: self.operation,
        }
    }

    /// Records another local mutation under this key.
    ///
    /// The idempotency id is kept. A synced record starts a new cycle.
    pub fn enqueue_again(&mut self, now: DateTime<Utc>) {
        if self.state == SyncState::Synced {
            self.retry_count = 0;
            self.last_error = None;
        }
        self.state = SyncState::Pending;
        self.updated_at = now;
    }

    /// `failed → pending`, before another push attempt.
    pub fn begin_retry(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.expect_state(SyncState::Failed, SyncState::Pending)?;
        self.state = SyncState::Pending;
        self.updated_at = now;
        Ok(())
    }

    /// `pending → synced`.
    pub fn mark_synced(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.expect_state(SyncState::Pending, SyncState::Synced)?;
        self.state = SyncState::Synced;
        self.last_error = None;
        self.last_attempt_at = Some(now);
        self.last_synced_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// `pending → failed`, counting the attempt.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> CoreResult<()> {
        self.expect_state(SyncState::Pending, SyncState::Failed)?;
        self.state = SyncState::Failed;
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error.into());
        self.last_attempt_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn expect_state(&self, expected: SyncState, next: SyncState) -> CoreResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoreError::InvalidSyncTransition {
                item_id: self.item_id.clone(),
                from: self.state.to_string(),
                to: next.to_string(),
            })
        }
    }
}

/// Orders records for retry fairness: never attempted first, then oldest
/// attempt, then creation time, then item id.
pub fn compare_for_retry(a: &SyncMetadata, b: &SyncMetadata) -> std::cmp::Ordering {
    a.last_attempt_at
        .cmp(&b.last_attempt_at)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.item_id.cmp(&b.item_id))
}

// =============================================================================
// Warm-up Runs
// =============================================================================

/// Identity of a per-launch warm-up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WarmupKey {
    pub launch_id: String,
    pub household_id: String,
    pub window_days: u32,
}

/// Marker that the expiring-window warm-up already ran for a launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupRun {
    pub launch_id: String,
    pub household_id: String,
    pub window_days: u32,
    pub executed_at: DateTime<Utc>,
    /// Number of items found; `None` while the scan is still running.
    pub item_count: Option<u64>,
}

impl WarmupRun {
    pub fn claim(key: &WarmupKey, now: DateTime<Utc>) -> Self {
        WarmupRun {
            launch_id: key.launch_id.clone(),
            household_id: key.household_id.clone(),
            window_days: key.window_days,
            executed_at: now,
            item_count: None,
        }
    }

    pub fn key(&self) -> WarmupKey {
        WarmupKey {
            launch_id: self.launch_id.clone(),
            household_id: self.household_id.clone(),
            window_days: self.window_days,
        }
    }
}
