//! # Sync State Repository
//!
//! Stores one [`SyncMetadata`] record per (household, operation, item) and a
//! ledger of every request id a caller sent.
//!
//! ## Idempotency
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  upsert_metadata([record])          (one transaction per call)         │
//! │       │                                                                 │
//! │       ├── sync_metadata   INSERT .. ON CONFLICT DO UPDATE              │
//! │       │                   idempotency_request_id and created_at are    │
//! │       │                   never overwritten                            │
//! │       │                                                                 │
//! │       └── sync_requests   INSERT OR IGNORE (request id → item id)      │
//! │                                                                         │
//! │  metadata_for_request(R) joins the ledger to the record, so a second   │
//! │  add that merged into an existing batch is still found by its own R.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use pantry_core::ports::SyncStateStore;
use pantry_core::{AddOutcome, RepositoryResult, SyncMetadata, SyncOperation, SyncState};

use super::{from_millis, from_opt_millis, opt_millis, to_millis};
use crate::error::{DbError, DbResult};

const ENTITY: &str = "sync_metadata";

const COLUMNS: &str = r#"
    m.household_id, m.operation, m.item_id, m.state, m.retry_count, m.last_error,
    m.last_attempt_at, m.last_synced_at, m.idempotency_request_id, m.add_outcome,
    m.created_at, m.updated_at
"#;

/// Repository for sync metadata.
#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    pool: SqlitePool,
}

impl SyncStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncStateRepository { pool }
    }

    /// Writes every record in one transaction.
    pub async fn upsert_metadata(&self, records: &[SyncMetadata]) -> DbResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        write_records(&mut *tx, records).await?;
        tx.commit().await?;

        debug!(count = records.len(), "Sync metadata committed");
        Ok(())
    }

    /// Records in `state`, never-attempted first, then oldest attempt,
    /// then creation time, then item id.
    pub async fn fetch_by_state(
        &self,
        household_id: &str,
        state: SyncState,
        limit: Option<u32>,
    ) -> DbResult<Vec<SyncMetadata>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM sync_metadata m
            WHERE m.household_id = ?1 AND m.state = ?2
            ORDER BY m.last_attempt_at IS NOT NULL, m.last_attempt_at ASC, m.created_at ASC, m.item_id ASC
            LIMIT ?3
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(household_id)
            .bind(state.as_str())
            // SQLite treats a negative LIMIT as "no limit"
            .bind(limit.map(i64::from).unwrap_or(-1))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode).collect()
    }

    /// Failed records that still have attempts left, in retry order.
    ///
    /// `max_attempts == 0` means no cap.
    pub async fn fetch_retryable(
        &self,
        household_id: &str,
        max_attempts: u32,
        limit: Option<u32>,
    ) -> DbResult<Vec<SyncMetadata>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM sync_metadata m
            WHERE m.household_id = ?1 AND m.state = 'failed'
              AND (?2 = 0 OR m.retry_count < ?2)
            ORDER BY m.last_attempt_at IS NOT NULL, m.last_attempt_at ASC, m.created_at ASC, m.item_id ASC
            LIMIT ?3
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(household_id)
            .bind(i64::from(max_attempts))
            .bind(limit.map(i64::from).unwrap_or(-1))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode).collect()
    }

    pub async fn count_exhausted(&self, household_id: &str, max_attempts: u32) -> DbResult<i64> {
        if max_attempts == 0 {
            return Ok(0);
        }
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_metadata WHERE household_id = ?1 AND state = 'failed' AND retry_count >= ?2",
        )
        .bind(household_id)
        .bind(i64::from(max_attempts))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn metadata(
        &self,
        item_id: &str,
        household_id: &str,
        operation: SyncOperation,
    ) -> DbResult<Option<SyncMetadata>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM sync_metadata m
            WHERE m.household_id = ?1 AND m.operation = ?2 AND m.item_id = ?3
            "#
        );

        let row = sqlx::query(&sql)
            .bind(household_id)
            .bind(operation.as_str())
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode).transpose()
    }

    /// Looks a record up by any request id that was written through it.
    ///
    /// `add_outcome` reflects the outcome of that particular request.
    pub async fn metadata_for_request(
        &self,
        request_id: &str,
        household_id: &str,
        operation: SyncOperation,
    ) -> DbResult<Option<SyncMetadata>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS}, r.add_outcome AS request_outcome
            FROM sync_requests r
            JOIN sync_metadata m
              ON m.household_id = r.household_id
             AND m.operation = r.operation
             AND m.item_id = r.item_id
            WHERE r.household_id = ?1 AND r.operation = ?2 AND r.request_id = ?3
            "#
        );

        let row = sqlx::query(&sql)
            .bind(household_id)
            .bind(operation.as_str())
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = decode(&row)?;
        let request_outcome: Option<String> = row.try_get("request_outcome")?;
        if let Some(outcome) = request_outcome {
            record.add_outcome = Some(parse(&record.item_id, &outcome)?);
        }
        Ok(Some(record))
    }

    /// Every record of one item, ordered by operation.
    pub async fn fetch_for_item(&self, item_id: &str, household_id: &str) -> DbResult<Vec<SyncMetadata>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM sync_metadata m
            WHERE m.household_id = ?1 AND m.item_id = ?2
            ORDER BY m.operation ASC
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(household_id)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode).collect()
    }

    pub async fn count_by_state(&self, household_id: &str, state: SyncState) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_metadata WHERE household_id = ?1 AND state = ?2")
            .bind(household_id)
            .bind(state.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Upserts records and files their request ids in the ledger, inside the
/// caller's transaction.
pub(crate) async fn write_records(conn: &mut SqliteConnection, records: &[SyncMetadata]) -> DbResult<()> {
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO sync_metadata (
                household_id, operation, item_id, state, retry_count, last_error,
                last_attempt_at, last_synced_at, idempotency_request_id, add_outcome,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?12
            )
            ON CONFLICT(household_id, operation, item_id) DO UPDATE SET
                state = excluded.state,
                retry_count = excluded.retry_count,
                last_error = excluded.last_error,
                last_attempt_at = excluded.last_attempt_at,
                last_synced_at = excluded.last_synced_at,
                add_outcome = COALESCE(excluded.add_outcome, sync_metadata.add_outcome),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.household_id)
        .bind(record.operation.as_str())
        .bind(&record.item_id)
        .bind(record.state.as_str())
        .bind(i64::from(record.retry_count))
        .bind(&record.last_error)
        .bind(opt_millis(record.last_attempt_at))
        .bind(opt_millis(record.last_synced_at))
        .bind(&record.idempotency_request_id)
        .bind(record.add_outcome.map(|o| o.as_str()))
        .bind(to_millis(record.created_at))
        .bind(to_millis(record.updated_at))
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO sync_requests (
                household_id, operation, request_id, item_id, add_outcome, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&record.household_id)
        .bind(record.operation.as_str())
        .bind(&record.idempotency_request_id)
        .bind(&record.item_id)
        .bind(record.add_outcome.map(|o| o.as_str()))
        .bind(to_millis(record.updated_at))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn parse<T: std::str::FromStr>(item_id: &str, value: &str) -> DbResult<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| DbError::decode(ENTITY, item_id, e))
}

fn decode(row: &SqliteRow) -> DbResult<SyncMetadata> {
    let item_id: String = row.try_get("item_id")?;

    let operation: String = row.try_get("operation")?;
    let state: String = row.try_get("state")?;
    let add_outcome: Option<String> = row.try_get("add_outcome")?;
    let retry_count: i64 = row.try_get("retry_count")?;

    Ok(SyncMetadata {
        household_id: row.try_get("household_id")?,
        operation: parse(&item_id, &operation)?,
        state: parse(&item_id, &state)?,
        retry_count: u32::try_from(retry_count).map_err(|e| DbError::decode(ENTITY, &item_id, e))?,
        last_error: row.try_get("last_error")?,
        last_attempt_at: from_opt_millis(ENTITY, &item_id, row.try_get("last_attempt_at")?)?,
        last_synced_at: from_opt_millis(ENTITY, &item_id, row.try_get("last_synced_at")?)?,
        idempotency_request_id: row.try_get("idempotency_request_id")?,
        add_outcome: add_outcome
            .map(|o| parse::<AddOutcome>(&item_id, &o))
            .transpose()?,
        created_at: from_millis(ENTITY, &item_id, row.try_get("created_at")?)?,
        updated_at: from_millis(ENTITY, &item_id, row.try_get("updated_at")?)?,
        item_id,
    })
}

// =============================================================================
// Port Implementation
// =============================================================================

#[async_trait]
impl SyncStateStore for SyncStateRepository {
    async fn upsert_metadata(&self, records: &[SyncMetadata]) -> RepositoryResult<()> {
        Ok(SyncStateRepository::upsert_metadata(self, records).await?)
    }

    async fn fetch_by_state(
        &self,
        household_id: &str,
        state: SyncState,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<SyncMetadata>> {
        Ok(SyncStateRepository::fetch_by_state(self, household_id, state, limit).await?)
    }

    async fn fetch_retryable(
        &self,
        household_id: &str,
        max_attempts: u32,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<SyncMetadata>> {
        Ok(SyncStateRepository::fetch_retryable(self, household_id, max_attempts, limit).await?)
    }

    async fn count_exhausted(&self, household_id: &str, max_attempts: u32) -> RepositoryResult<i64> {
        Ok(SyncStateRepository::count_exhausted(self, household_id, max_attempts).await?)
    }

    async fn metadata(
        &self,
        item_id: &str,
        household_id: &str,
        operation: SyncOperation,
    ) -> RepositoryResult<Option<SyncMetadata>> {
        Ok(SyncStateRepository::metadata(self, item_id, household_id, operation).await?)
    }

    async fn metadata_for_request(
        &self,
        request_id: &str,
        household_id: &str,
        operation: SyncOperation,
    ) -> RepositoryResult<Option<SyncMetadata>> {
        Ok(SyncStateRepository::metadata_for_request(self, request_id, household_id, operation).await?)
    }

    async fn fetch_for_item(&self, item_id: &str, household_id: &str) -> RepositoryResult<Vec<SyncMetadata>> {
        Ok(SyncStateRepository::fetch_for_item(self, item_id, household_id).await?)
    }

    async fn count_by_state(&self, household_id: &str, state: SyncState) -> RepositoryResult<i64> {
        Ok(SyncStateRepository::count_by_state(self, household_id, state).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
