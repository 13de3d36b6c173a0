//! # pantry-db: Local Store for Pantry
//!
//! SQLite implementations of the store ports declared in `pantry-core`.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         pantry-db                                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      Database                                   │   │
//! │  │   pool: SqlitePool                                              │   │
//! │  │                                                                 │   │
//! │  │   inventory()  ──► InventoryRepository   impl InventoryStore    │   │
//! │  │   locations()  ──► LocationRepository    impl LocationStore     │   │
//! │  │   sync_state() ──► SyncStateRepository   impl SyncStateStore    │   │
//! │  │   warmups()    ──► WarmupRepository      impl WarmupRunStore    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  migrations/sqlite/*.sql embedded with sqlx::migrate!()                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust,ignore
//! let db = Database::new(DbConfig::new("./pantry.db")).await?;
//! let expiring = db.inventory().fetch_expiring("h1", Utc::now(), 3, &tz).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::inventory::InventoryRepository;
pub use repository::location::LocationRepository;
pub use repository::sync_state::SyncStateRepository;
pub use repository::warmup::WarmupRepository;
