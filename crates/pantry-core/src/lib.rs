//! # pantry-core: Pure Domain Logic for Pantry
//!
//! Domain model and policies of the household inventory sync engine. Nothing
//! in this crate performs I/O; persistence and the network are reached
//! through the traits in [`ports`].
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pantry Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │         Capture / manual entry (out of scope)                   │   │
//! │  │         produces InventoryDraft                                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    pantry-sync (use cases)                      │   │
//! │  │    add, consume, move, update-dates, sync-pending, warm-up     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ pantry-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   merge   │  │   fefo    │  │ sync_meta │  │   │
//! │  │   │ Inventory │  │ MergeKey  │  │  sort +   │  │  pending/ │  │   │
//! │  │   │   Item    │  │  decide   │  │   plan    │  │  synced   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO WALL CLOCK            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    pantry-db (SQLite adapters)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Inventory items, quantities, dates, locations
//! - [`merge`] - Merge-vs-create decision
//! - [`fefo`] - First-expired-first-out ordering and consumption plans
//! - [`calendar`] - Day boundaries in a caller-supplied offset
//! - [`summary`] - Per-product aggregates
//! - [`sync_meta`] - Sync metadata state machine and warm-up markers
//! - [`ports`] - Store, remote and connectivity traits
//! - [`error`] - Domain error types
//! - [`validation`] - Input rules
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use pantry_core::{merge, InventoryDraft, InventoryItem, Quantity};
//!
//! let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
//! let draft = InventoryDraft::new("h1", "p1", Quantity::pieces(2.0), "loc1");
//! let mut stored = InventoryItem::from_draft("item-1", draft.clone(), now).unwrap();
//!
//! // Same batch observed again: it merges instead of creating a record.
//! let again = InventoryDraft::new("h1", "p1", Quantity::pieces(1.0), "loc1");
//! assert!(merge::can_merge(&stored, &merge::key_for_draft(&again)));
//! stored.absorb(&again.quantity, now).unwrap();
//! assert_eq!(stored.quantity.value, 3.0);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod calendar;
pub mod error;
pub mod fefo;
pub mod merge;
pub mod ports;
pub mod summary;
pub mod sync_meta;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{
    CoreError, CoreResult, RemoteError, RemoteResult, RepositoryError, RepositoryResult, ValidationError,
};
pub use merge::MergeKey;
pub use summary::ProductSummary;
pub use sync_meta::{AddOutcome, SyncMetadata, SyncOperation, SyncState, WarmupKey, WarmupRun};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of any opaque identifier.
pub const MAX_ID_LENGTH: usize = 128;

/// Upper bound for an expiring-items window.
pub const MAX_WINDOW_DAYS: u32 = 365;

/// Window used by views that do not choose one.
pub const DEFAULT_WINDOW_DAYS: u32 = 3;

/// Generates a new opaque id (item ids, idempotency request ids).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
