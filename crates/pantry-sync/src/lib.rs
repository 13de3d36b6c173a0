//! # pantry-sync: Offline-First Inventory Orchestrator
//!
//! Use cases for a household inventory that works without a network and
//! catches up when one appears.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Presentation layer                              │
//! │        add / consume / move / discard / expiring / summaries            │
//! └───────────────────────────────┬─────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    InventoryService (service.rs)                        │
//! │                                                                         │
//! │  writes ──► local store commit ──► sync metadata PENDING                │
//! │  reads  ──► local store only                                            │
//! │                                                                         │
//! │  sync_pending (drain.rs)          refresh_from_remote (reconcile.rs)    │
//! │  local ──► remote                 remote ──► local                      │
//! │                                                                         │
//! │  warm_expiring_window (warmup.rs): once per launch                      │
//! └───────┬───────────────────────────────────────┬─────────────────────────┘
//!         │ ports (pantry-core)                   │
//!         ▼                                       ▼
//! ┌──────────────────────┐              ┌──────────────────────┐
//! │ pantry-db (SQLite)   │              │ RemoteGateway        │
//! └──────────────────────┘              └──────────────────────┘
//!
//!   SyncWorker (worker.rs): interval, online edge and manual triggers
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use pantry_core::{InventoryDraft, Quantity};
//! use pantry_db::Database;
//! use pantry_sync::{ConnectivityMonitor, InventoryService, LoopbackRemote, PantryConfig, Stores};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PantryConfig::load_or_default(None);
//! let db = Database::new(config.database.to_db_config()).await?;
//! let connectivity = ConnectivityMonitor::new(false);
//!
//! let service = InventoryService::new(
//!     Stores::sqlite(&db),
//!     Arc::new(LoopbackRemote::new()),
//!     Arc::new(connectivity.clone()),
//!     &config,
//! );
//!
//! let draft = InventoryDraft::new("household-1", "milk", Quantity::pieces(2.0), "fridge");
//! service.add(draft, None).await?;
//!
//! connectivity.set_online(true);
//! service.sync_pending("household-1").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connectivity;
pub mod drain;
pub mod error;
pub mod locks;
pub mod reconcile;
pub mod remote;
pub mod retry;
pub mod service;
pub mod warmup;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{DatabaseSettings, DeviceConfig, InventorySettings, PantryConfig, SyncMode, SyncSettings};
pub use connectivity::ConnectivityMonitor;
pub use drain::SyncReport;
pub use error::{SyncError, SyncResult};
pub use reconcile::RefreshReport;
pub use remote::LoopbackRemote;
pub use retry::RetryPolicy;
pub use service::{AddResult, InventoryService, Stores, SyncStatus};
pub use warmup::WarmupOutcome;
pub use worker::{SyncWorker, SyncWorkerHandle};
