//! # Database Migrations
//!
//! Schema migrations embedded at compile time.
//!
//! ## Migration Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Migration Flow                                       │
//! │                                                                         │
//! │  migrations/sqlite/                                                    │
//! │  └── 001_initial_schema.sql   storage_locations, inventory_items,      │
//! │                               sync_metadata, sync_requests,            │
//! │                               warmup_runs                              │
//! │                                                                         │
//! │  sqlx::migrate!() embeds every file; `_sqlx_migrations` records which  │
//! │  ones ran, so running on every start is safe.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/sqlite` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations.
///
/// Idempotent; each migration runs in its own transaction, in filename order.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)` for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}
