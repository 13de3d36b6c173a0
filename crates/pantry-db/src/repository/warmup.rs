//! Warm-up markers, one per (launch, household, window).
//!
//! Claiming is a single `INSERT OR IGNORE`, so two concurrent warm-ups for
//! the same key cannot both win.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use pantry_core::ports::WarmupRunStore;
use pantry_core::{RepositoryResult, WarmupKey, WarmupRun};

use super::to_millis;
use crate::error::DbResult;

/// Repository for warm-up markers.
#[derive(Debug, Clone)]
pub struct WarmupRepository {
    pool: SqlitePool,
}

impl WarmupRepository {
    pub fn new(pool: SqlitePool) -> Self {
        WarmupRepository { pool }
    }

    /// Returns true if this call inserted the marker.
    pub async fn try_claim(&self, run: &WarmupRun) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO warmup_runs (launch_id, household_id, window_days, executed_at, item_count)
            VALUES (?1, ?2, ?3, ?4, NULL)
            "#,
        )
        .bind(&run.launch_id)
        .bind(&run.household_id)
        .bind(i64::from(run.window_days))
        .bind(to_millis(run.executed_at))
        .execute(&self.pool)
        .await?;

        let claimed = result.rows_affected() == 1;
        debug!(launch_id = %run.launch_id, window_days = run.window_days, claimed, "Warm-up claim");
        Ok(claimed)
    }

    pub async fn has_run(&self, key: &WarmupKey) -> DbResult<bool> {
        let exists: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM warmup_runs
                WHERE launch_id = ?1 AND household_id = ?2 AND window_days = ?3
            )
            "#,
        )
        .bind(&key.launch_id)
        .bind(&key.household_id)
        .bind(i64::from(key.window_days))
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    pub async fn release(&self, key: &WarmupKey) -> DbResult<()> {
        sqlx::query("DELETE FROM warmup_runs WHERE launch_id = ?1 AND household_id = ?2 AND window_days = ?3")
            .bind(&key.launch_id)
            .bind(&key.household_id)
            .bind(i64::from(key.window_days))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn finish(&self, key: &WarmupKey, item_count: u64) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE warmup_runs SET item_count = ?4
            WHERE launch_id = ?1 AND household_id = ?2 AND window_days = ?3
            "#,
        )
        .bind(&key.launch_id)
        .bind(&key.household_id)
        .bind(i64::from(key.window_days))
        .bind(i64::try_from(item_count).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Item count recorded by `finish`, if the run finished.
    pub async fn item_count(&self, key: &WarmupKey) -> DbResult<Option<u64>> {
        let count: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT item_count FROM warmup_runs WHERE launch_id = ?1 AND household_id = ?2 AND window_days = ?3",
        )
        .bind(&key.launch_id)
        .bind(&key.household_id)
        .bind(i64::from(key.window_days))
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.flatten().map(|c| c.max(0) as u64))
    }
}

#[async_trait]
impl WarmupRunStore for WarmupRepository {
    async fn try_claim(&self, run: &WarmupRun) -> RepositoryResult<bool> {
        Ok(WarmupRepository::try_claim(self, run).await?)
    }

    async fn has_run(&self, key: &WarmupKey) -> RepositoryResult<bool> {
        Ok(WarmupRepository::has_run(self, key).await?)
    }

    async fn release(&self, key: &WarmupKey) -> RepositoryResult<()> {
        Ok(WarmupRepository::release(self, key).await?)
    }

    async fn finish(&self, key: &WarmupKey, item_count: u64) -> RepositoryResult<()> {
        Ok(WarmupRepository::finish(self, key, item_count).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;

    fn key(window_days: u32) -> WarmupKey {
        WarmupKey {
            launch_id: "launch-1".into(),
            household_id: "h1".into(),
            window_days,
        }
    }

    #[tokio::test]
    async fn test_claim_once_per_key() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().warmups();
        let run = WarmupRun::claim(&key(3), Utc::now());

        assert!(repo.try_claim(&run).await.unwrap());
        assert!(!repo.try_claim(&run).await.unwrap());
        assert!(repo.has_run(&key(3)).await.unwrap());
        assert!(!repo.has_run(&key(7)).await.unwrap());

        assert_eq!(repo.item_count(&key(3)).await.unwrap(), None);
        repo.finish(&key(3), 4).await.unwrap();
        assert_eq!(repo.item_count(&key(3)).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_release_allows_reclaim() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().warmups();
        let run = WarmupRun::claim(&key(3), Utc::now());

        assert!(repo.try_claim(&run).await.unwrap());
        repo.release(&key(3)).await.unwrap();
        assert!(!repo.has_run(&key(3)).await.unwrap());
        assert!(repo.try_claim(&run).await.unwrap());
    }
}
