//! # Inventory Repository
//!
//! Persistence for inventory batches.
//!
//! ## Storage Layout
//! ```text
//! inventory_items
//! ├── id, household_id, product_id, status        filter columns
//! ├── storage_location_id, lot_code               merge key columns
//! ├── expiry_at, opened_at                        merge key + expiry views (ms)
//! ├── created_at, updated_at                      ordering (ms)
//! └── payload                                     full item as JSON
//! ```
//!
//! The payload is the source of truth when reading; the other columns are
//! projections kept in step on every write.
//!
//! ## Upsert Guard
//! An upsert never moves an existing row to another household and never
//! moves a terminal row to a different status. A guarded upsert that
//! matches nothing fails with [`DbError::WriteRejected`].
//!
//! ## Local Commits
//! ```text
//! commit(writes, records)                       one transaction
//!   for each write
//!     ├── active? merge key held by another active row ──► WriteRejected
//!     ├── active? location missing in household ─────────► WriteRejected
//!     └── INSERT (Create) / guarded upsert (Update)
//!   sync_state::write_records(records)
//! ```
//! A write that keeps its row's current key is not re-checked, so an
//! existing duplicate pulled from another device can still be consumed.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use pantry_core::calendar::ExpiryWindow;
use pantry_core::merge::{self, MergeKey};
use pantry_core::ports::{InventoryStore, ItemWrite};
use pantry_core::summary::{self, ProductSummary};
use pantry_core::{fefo, InventoryItem, ItemStatus, RepositoryResult, SyncMetadata};

use super::sync_state::write_records;
use super::{opt_millis, to_millis};
use crate::error::{DbError, DbResult};

const ENTITY: &str = "inventory_item";

const INSERT_SQL: &str = r#"
    INSERT INTO inventory_items (
        id, household_id, product_id, status, storage_location_id,
        lot_code, expiry_at, opened_at, created_at, updated_at, payload
    ) VALUES (
        ?1, ?2, ?3, ?4, ?5,
        ?6, ?7, ?8, ?9, ?10, ?11
    )
"#;

const MERGE_CANDIDATES_SQL: &str = r#"
    SELECT id, payload FROM inventory_items
    WHERE household_id = ?1
      AND product_id = ?2
      AND status = 'active'
      AND storage_location_id = ?3
      AND lot_code IS ?4
      AND expiry_at IS ?5
      AND opened_at IS ?6
    ORDER BY created_at ASC, id ASC
"#;

const UPSERT_SQL: &str = r#"
    INSERT INTO inventory_items (
        id, household_id, product_id, status, storage_location_id,
        lot_code, expiry_at, opened_at, created_at, updated_at, payload
    ) VALUES (
        ?1, ?2, ?3, ?4, ?5,
        ?6, ?7, ?8, ?9, ?10, ?11
    )
    ON CONFLICT(id) DO UPDATE SET
        product_id = excluded.product_id,
        status = excluded.status,
        storage_location_id = excluded.storage_location_id,
        lot_code = excluded.lot_code,
        expiry_at = excluded.expiry_at,
        opened_at = excluded.opened_at,
        updated_at = excluded.updated_at,
        payload = excluded.payload
    WHERE inventory_items.household_id = excluded.household_id
      AND (inventory_items.status = 'active' OR inventory_items.status = excluded.status)
"#;

/// Repository for inventory batches.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Inserts a new item.
    ///
    /// ## Errors
    /// `UniqueViolation` if an item with the same id exists.
    pub async fn create(&self, item: &InventoryItem) -> DbResult<()> {
        debug!(item_id = %item.id, household_id = %item.household_id, "Creating inventory item");

        write_item(&self.pool, INSERT_SQL, item).await
    }

    /// Inserts or replaces an item, subject to the upsert guard.
    pub async fn upsert(&self, item: &InventoryItem) -> DbResult<()> {
        write_guarded(&self.pool, item).await
    }

    /// Applies local item writes and their sync records in one transaction.
    ///
    /// Any rejected write rolls back every item and record of the call.
    pub async fn commit(&self, writes: &[ItemWrite<'_>], records: &[SyncMetadata]) -> DbResult<()> {
        if writes.is_empty() && records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for write in writes {
            let item = write.item();
            check_local_write(&mut *tx, item).await?;
            match write {
                ItemWrite::Create(item) => write_item(&mut *tx, INSERT_SQL, item).await?,
                ItemWrite::Update(item) => write_guarded(&mut *tx, item).await?,
            }
        }
        write_records(&mut *tx, records).await?;
        tx.commit().await?;

        debug!(items = writes.len(), records = records.len(), "Local inventory commit");
        Ok(())
    }

    /// Returns true if the household has any item, whatever its status.
    pub async fn has_any_items(&self, household_id: &str) -> DbResult<bool> {
        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM inventory_items WHERE household_id = ?1)")
                .bind(household_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists != 0)
    }

    /// Finds an item by id within a household.
    pub async fn find_by_id(&self, id: &str, household_id: &str) -> DbResult<Option<InventoryItem>> {
        let row = sqlx::query("SELECT id, payload FROM inventory_items WHERE id = ?1 AND household_id = ?2")
            .bind(id)
            .bind(household_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode).transpose()
    }

    /// Active items whose stored key matches `key`, earliest-created first.
    pub async fn find_merge_candidates(&self, key: &MergeKey) -> DbResult<Vec<InventoryItem>> {
        let rows = bind_key(sqlx::query(MERGE_CANDIDATES_SQL), key)
            .fetch_all(&self.pool)
            .await?;

        // Columns hold millisecond precision; the key comparison is exact.
        Ok(decode_all(&rows)?
            .into_iter()
            .filter(|item| merge::can_merge(item, key))
            .collect())
    }

    /// Active batches of a product by ascending `created_at`.
    pub async fn fetch_active_batches(&self, product_id: &str, household_id: &str) -> DbResult<Vec<InventoryItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload FROM inventory_items
            WHERE household_id = ?1 AND product_id = ?2 AND status = 'active'
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(household_id)
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        decode_all(&rows)
    }

    /// Every active item of the household in FEFO order.
    pub async fn fetch_active_by_household_sorted_by_expiry(
        &self,
        household_id: &str,
        as_of: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> DbResult<Vec<InventoryItem>> {
        debug!(household_id, %as_of, %tz, "Fetching active inventory");

        let rows = sqlx::query(
            r#"
            SELECT id, payload FROM inventory_items
            WHERE household_id = ?1 AND status = 'active'
            ORDER BY expiry_at IS NULL, expiry_at ASC, created_at ASC, id ASC
            "#,
        )
        .bind(household_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(fefo::sort_for_consumption(decode_all(&rows)?))
    }

    /// Active items whose resolved expiry is before the start of today in `tz`.
    pub async fn fetch_expired(
        &self,
        household_id: &str,
        as_of: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> DbResult<Vec<InventoryItem>> {
        let window = ExpiryWindow::new(as_of, 0, tz);

        let rows = sqlx::query(
            r#"
            SELECT id, payload FROM inventory_items
            WHERE household_id = ?1
              AND status = 'active'
              AND expiry_at IS NOT NULL
              AND expiry_at < ?2
            ORDER BY expiry_at ASC, created_at ASC, id ASC
            "#,
        )
        .bind(household_id)
        .bind(to_millis(window.start_of_today))
        .fetch_all(&self.pool)
        .await?;

        let items = decode_all(&rows)?
            .into_iter()
            .filter(|item| item.expiry_date().is_some_and(|e| window.is_expired(e)))
            .collect();
        Ok(fefo::sort_for_consumption(items))
    }

    /// Active items expiring within `[start_of_today, start_of_today + window_days]`.
    pub async fn fetch_expiring(
        &self,
        household_id: &str,
        as_of: DateTime<Utc>,
        window_days: u32,
        tz: &FixedOffset,
    ) -> DbResult<Vec<InventoryItem>> {
        let window = ExpiryWindow::new(as_of, window_days, tz);

        let rows = sqlx::query(
            r#"
            SELECT id, payload FROM inventory_items
            WHERE household_id = ?1
              AND status = 'active'
              AND expiry_at IS NOT NULL
              AND expiry_at >= ?2
              AND expiry_at <= ?3
            ORDER BY expiry_at ASC, created_at ASC, id ASC
            "#,
        )
        .bind(household_id)
        .bind(to_millis(window.start_of_today))
        .bind(to_millis(window.window_end))
        .fetch_all(&self.pool)
        .await?;

        let items = decode_all(&rows)?
            .into_iter()
            .filter(|item| item.expiry_date().is_some_and(|e| window.is_expiring(e)))
            .collect();
        Ok(fefo::sort_for_consumption(items))
    }

    /// Aggregate over every batch of one product.
    pub async fn summarize_by_product(&self, product_id: &str, household_id: &str) -> DbResult<ProductSummary> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload FROM inventory_items
            WHERE household_id = ?1 AND product_id = ?2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(household_id)
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(summary::summarize(&decode_all(&rows)?)
            .into_iter()
            .next()
            .unwrap_or_else(|| ProductSummary::empty(product_id)))
    }

    /// Per-product aggregates over every batch of the household.
    pub async fn summarize_household(&self, household_id: &str) -> DbResult<Vec<ProductSummary>> {
        let items = self.fetch_by_household(household_id, None).await?;
        Ok(summary::summarize(&items))
    }

    /// Items of the household in creation order, optionally filtered by status.
    pub async fn fetch_by_household(
        &self,
        household_id: &str,
        status: Option<ItemStatus>,
    ) -> DbResult<Vec<InventoryItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload FROM inventory_items
            WHERE household_id = ?1 AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(household_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        decode_all(&rows)
    }

    /// Counts active items of the household.
    pub async fn count_active(&self, household_id: &str) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM inventory_items WHERE household_id = ?1 AND status = 'active'")
                .bind(household_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_key<'q>(query: SqliteQuery<'q>, key: &'q MergeKey) -> SqliteQuery<'q> {
    query
        .bind(&key.household_id)
        .bind(&key.product_id)
        .bind(&key.storage_location_id)
        .bind(key.lot_code.as_deref())
        .bind(opt_millis(key.expiry_date))
        .bind(opt_millis(key.opened_at))
}

/// Rejects an active write that moves onto a merge key another active row
/// holds, or onto a location the household does not have. Whatever the row
/// already had is not re-checked.
async fn check_local_write(conn: &mut SqliteConnection, item: &InventoryItem) -> DbResult<()> {
    if !item.is_active() {
        return Ok(());
    }

    let current = sqlx::query("SELECT id, payload FROM inventory_items WHERE id = ?1")
        .bind(&item.id)
        .fetch_optional(&mut *conn)
        .await?;
    let current = current.as_ref().map(decode).transpose()?;

    let same_location = current
        .as_ref()
        .is_some_and(|c| c.storage_location_id == item.storage_location_id);
    if !same_location {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM storage_locations WHERE id = ?1 AND household_id = ?2)",
        )
        .bind(&item.storage_location_id)
        .bind(&item.household_id)
        .fetch_one(&mut *conn)
        .await?;
        if exists == 0 {
            return Err(DbError::rejected(
                ENTITY,
                &item.id,
                format!("unknown storage location {}", item.storage_location_id),
            ));
        }
    }

    let key = merge::key_for(item);
    if current.as_ref().is_some_and(|c| merge::can_merge(c, &key)) {
        return Ok(());
    }

    let rows = bind_key(sqlx::query(MERGE_CANDIDATES_SQL), &key)
        .fetch_all(&mut *conn)
        .await?;
    let holder = decode_all(&rows)?
        .into_iter()
        .find(|other| other.id != item.id && merge::can_merge(other, &key));

    match holder {
        Some(holder) => {
            warn!(item_id = %item.id, holder_id = %holder.id, "Merge key already held by an active item");
            Err(DbError::rejected(
                ENTITY,
                &item.id,
                format!("merge key held by active item {}", holder.id),
            ))
        }
        None => Ok(()),
    }
}

async fn write_guarded<'e, E>(executor: E, item: &InventoryItem) -> DbResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = bind_item(sqlx::query(UPSERT_SQL), item)?.execute(executor).await?;

    if result.rows_affected() == 0 {
        warn!(item_id = %item.id, status = %item.status, "Guarded inventory upsert rejected");
        return Err(DbError::rejected(
            ENTITY,
            &item.id,
            "terminal status or household cannot change",
        ));
    }
    Ok(())
}

async fn write_item<'e, E>(executor: E, sql: &'static str, item: &InventoryItem) -> DbResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    bind_item(sqlx::query(sql), item)?.execute(executor).await?;
    Ok(())
}

fn bind_item<'q>(query: SqliteQuery<'q>, item: &'q InventoryItem) -> DbResult<SqliteQuery<'q>> {
    let payload = encode(item)?;
    Ok(query
        .bind(&item.id)
        .bind(&item.household_id)
        .bind(item.product_id())
        .bind(item.status.as_str())
        .bind(&item.storage_location_id)
        .bind(merge::normalize_lot_code(item.lot_code.as_deref()))
        .bind(opt_millis(item.expiry_date()))
        .bind(opt_millis(item.opened_date()))
        .bind(to_millis(item.created_at))
        .bind(to_millis(item.updated_at))
        .bind(payload))
}

fn encode(item: &InventoryItem) -> DbResult<String> {
    serde_json::to_string(item).map_err(|e| DbError::Internal(format!("encode {ENTITY} {}: {e}", item.id)))
}

fn decode(row: &SqliteRow) -> DbResult<InventoryItem> {
    let id: String = row.try_get("id")?;
    let payload: String = row.try_get("payload")?;
    serde_json::from_str(&payload).map_err(|e| DbError::decode(ENTITY, id, e))
}

fn decode_all(rows: &[SqliteRow]) -> DbResult<Vec<InventoryItem>> {
    rows.iter().map(decode).collect()
}

// =============================================================================
// Port Implementation
// =============================================================================

#[async_trait]
impl InventoryStore for InventoryRepository {
    async fn create(&self, item: &InventoryItem) -> RepositoryResult<()> {
        Ok(InventoryRepository::create(self, item).await?)
    }

    async fn upsert(&self, item: &InventoryItem) -> RepositoryResult<()> {
        Ok(InventoryRepository::upsert(self, item).await?)
    }

    async fn commit(&self, writes: &[ItemWrite<'_>], records: &[SyncMetadata]) -> RepositoryResult<()> {
        Ok(InventoryRepository::commit(self, writes, records).await?)
    }

    async fn has_any_items(&self, household_id: &str) -> RepositoryResult<bool> {
        Ok(InventoryRepository::has_any_items(self, household_id).await?)
    }

    async fn find_by_id(&self, id: &str, household_id: &str) -> RepositoryResult<Option<InventoryItem>> {
        Ok(InventoryRepository::find_by_id(self, id, household_id).await?)
    }

    async fn find_merge_candidates(&self, key: &MergeKey) -> RepositoryResult<Vec<InventoryItem>> {
        Ok(InventoryRepository::find_merge_candidates(self, key).await?)
    }

    async fn fetch_active_batches(&self, product_id: &str, household_id: &str) -> RepositoryResult<Vec<InventoryItem>> {
        Ok(InventoryRepository::fetch_active_batches(self, product_id, household_id).await?)
    }

    async fn fetch_active_by_household_sorted_by_expiry(
        &self,
        household_id: &str,
        as_of: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> RepositoryResult<Vec<InventoryItem>> {
        Ok(InventoryRepository::fetch_active_by_household_sorted_by_expiry(self, household_id, as_of, tz).await?)
    }

    async fn fetch_expired(
        &self,
        household_id: &str,
        as_of: DateTime<Utc>,
        tz: &FixedOffset,
    ) -> RepositoryResult<Vec<InventoryItem>> {
        Ok(InventoryRepository::fetch_expired(self, household_id, as_of, tz).await?)
    }

    async fn fetch_expiring(
        &self,
        household_id: &str,
        as_of: DateTime<Utc>,
        window_days: u32,
        tz: &FixedOffset,
    ) -> RepositoryResult<Vec<InventoryItem>> {
        Ok(InventoryRepository::fetch_expiring(self, household_id, as_of, window_days, tz).await?)
    }

    async fn summarize_by_product(&self, product_id: &str, household_id: &str) -> RepositoryResult<ProductSummary> {
        Ok(InventoryRepository::summarize_by_product(self, product_id, household_id).await?)
    }

    async fn summarize_household(&self, household_id: &str) -> RepositoryResult<Vec<ProductSummary>> {
        Ok(InventoryRepository::summarize_household(self, household_id).await?)
    }

    async fn fetch_by_household(
        &self,
        household_id: &str,
        status: Option<ItemStatus>,
    ) -> RepositoryResult<Vec<InventoryItem>> {
        Ok(InventoryRepository::fetch_by_household(self, household_id, status).await?)
    }

    async fn count_active(&self, household_id: &str) -> RepositoryResult<i64> {
        Ok(InventoryRepository::count_active(self, household_id).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;
    use pantry_core::{AddOutcome, InventoryDraft, Quantity, StorageLocation, SyncOperation};

    async fn repo() -> InventoryRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().inventory()
    }

    async fn save_location(db: &Database, id: &str) {
        let location = StorageLocation::new(id, "h1", id, false, at(1, 0, 0)).unwrap();
        db.locations().save(&location).await.unwrap();
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, h, m, 0).unwrap()
    }

    fn item(id: &str, household: &str, expiry: Option<DateTime<Utc>>, created: DateTime<Utc>) -> InventoryItem {
        let mut draft = InventoryDraft::new(household, "p1", Quantity::pieces(1.0), "loc1");
        if let Some(expiry) = expiry {
            draft = draft.with_expiry(expiry);
        }
        InventoryItem::from_draft(id, draft, created).unwrap()
    }

    fn ids(items: &[InventoryItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_create_and_find_scoped_by_household() {
        let repo = repo().await;
        let stored = item("a", "h1", Some(at(10, 0, 0)), at(1, 0, 0));
        repo.create(&stored).await.unwrap();

        assert_eq!(repo.find_by_id("a", "h1").await.unwrap(), Some(stored));
        assert_eq!(repo.find_by_id("a", "h2").await.unwrap(), None);
        assert!(repo.has_any_items("h1").await.unwrap());
        assert!(!repo.has_any_items("h2").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_duplicate_id_fails() {
        let repo = repo().await;
        let stored = item("a", "h1", None, at(1, 0, 0));
        repo.create(&stored).await.unwrap();
        assert!(matches!(
            repo.create(&stored).await,
            Err(DbError::UniqueViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_upsert_refuses_terminal_regression() {
        let repo = repo().await;
        let mut stored = item("a", "h1", None, at(1, 0, 0));
        repo.create(&stored).await.unwrap();

        stored.transition(ItemStatus::Consumed, at(2, 0, 0)).unwrap();
        repo.upsert(&stored).await.unwrap();

        let mut revived = stored.clone();
        revived.status = ItemStatus::Active;
        assert!(matches!(
            repo.upsert(&revived).await,
            Err(DbError::WriteRejected { .. })
        ));

        let mut stolen = stored.clone();
        stolen.household_id = "h2".into();
        assert!(repo.upsert(&stolen).await.is_err());

        let loaded = repo.find_by_id("a", "h1").await.unwrap().unwrap();
        assert_eq!(loaded.status, ItemStatus::Consumed);
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.inventory();
        let mut a = item("a", "h1", None, at(1, 0, 0));
        let mut b = item("b", "h1", Some(at(9, 0, 0)), at(1, 0, 0));
        repo.create(&a).await.unwrap();
        b.transition(ItemStatus::Discarded, at(2, 0, 0)).unwrap();
        repo.create(&b).await.unwrap();

        a.quantity = Quantity::pieces(9.0);
        b.status = ItemStatus::Active;
        let record = SyncMetadata::pending("a", "h1", SyncOperation::Consume, "req-1", at(3, 0, 0));
        let result = repo
            .commit(&[ItemWrite::Update(&a), ItemWrite::Update(&b)], &[record])
            .await;
        assert!(matches!(result, Err(DbError::WriteRejected { .. })));

        let unchanged = repo.find_by_id("a", "h1").await.unwrap().unwrap();
        assert_eq!(unchanged.quantity.value, 1.0);
        assert!(db
            .sync_state()
            .metadata_for_request("req-1", "h1", SyncOperation::Consume)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_commit_writes_item_and_request_ledger_together() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        save_location(&db, "loc1").await;
        let repo = db.inventory();

        let created = item("a", "h1", None, at(1, 0, 0));
        let record = SyncMetadata::pending("a", "h1", SyncOperation::Add, "req-1", at(1, 0, 0))
            .with_outcome(AddOutcome::Created);
        repo.commit(&[ItemWrite::Create(&created)], &[record]).await.unwrap();

        assert!(repo.find_by_id("a", "h1").await.unwrap().is_some());
        let ledger = db
            .sync_state()
            .metadata_for_request("req-1", "h1", SyncOperation::Add)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.item_id, "a");
    }

    #[tokio::test]
    async fn test_commit_rejects_second_active_holder_of_a_key() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        save_location(&db, "loc1").await;
        save_location(&db, "shelf").await;
        let repo = db.inventory();

        let at_fridge = item("a", "h1", None, at(1, 0, 0));
        let shelf_draft = InventoryDraft::new("h1", "p1", Quantity::pieces(2.0), "shelf");
        let at_shelf = InventoryItem::from_draft("b", shelf_draft, at(2, 0, 0)).unwrap();
        repo.commit(&[ItemWrite::Create(&at_fridge), ItemWrite::Create(&at_shelf)], &[])
            .await
            .unwrap();

        let duplicate = item("c", "h1", None, at(3, 0, 0));
        assert!(matches!(
            repo.commit(&[ItemWrite::Create(&duplicate)], &[]).await,
            Err(DbError::WriteRejected { .. })
        ));

        let mut moved = at_fridge.clone();
        moved.move_to("shelf", at(4, 0, 0)).unwrap();
        assert!(repo.commit(&[ItemWrite::Update(&moved)], &[]).await.is_err());

        let mut nowhere = at_fridge.clone();
        nowhere.move_to("garage", at(4, 0, 0)).unwrap();
        assert!(repo.commit(&[ItemWrite::Update(&nowhere)], &[]).await.is_err());

        // Leaving the key unchanged is fine, and so is retiring the batch.
        let mut taken = at_fridge.clone();
        taken.take(&Quantity::pieces(0.5), at(5, 0, 0)).unwrap();
        repo.commit(&[ItemWrite::Update(&taken)], &[]).await.unwrap();

        let merge_key = merge::key_for(&at_shelf);
        assert_eq!(repo.find_merge_candidates(&merge_key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_merge_candidates_normalizes_lot_code() {
        let repo = repo().await;
        let draft = InventoryDraft::new("h1", "p1", Quantity::pieces(1.0), "loc1").with_lot_code(" L1 ");
        let stored = InventoryItem::from_draft("a", draft, at(1, 0, 0)).unwrap();
        repo.create(&stored).await.unwrap();

        let probe = InventoryDraft::new("h1", "p1", Quantity::pieces(1.0), "loc1").with_lot_code("L1");
        let found = repo.find_merge_candidates(&merge::key_for_draft(&probe)).await.unwrap();
        assert_eq!(ids(&found), vec!["a"]);

        let other = InventoryDraft::new("h1", "p1", Quantity::pieces(1.0), "loc1");
        assert!(repo
            .find_merge_candidates(&merge::key_for_draft(&other))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_expired_and_expiring_boundaries() {
        let repo = repo().await;
        repo.create(&item("late", "h1", Some(at(9, 23, 59)), at(1, 0, 0))).await.unwrap();
        repo.create(&item("edge", "h1", Some(at(10, 0, 0)), at(1, 0, 0))).await.unwrap();
        repo.create(&item("later", "h1", Some(at(12, 0, 0)), at(1, 0, 0))).await.unwrap();
        repo.create(&item("undated", "h1", None, at(1, 0, 0))).await.unwrap();

        let as_of = at(10, 0, 0);
        let expired = repo.fetch_expired("h1", as_of, &utc()).await.unwrap();
        assert_eq!(ids(&expired), vec!["late"]);

        let today = repo.fetch_expiring("h1", as_of, 0, &utc()).await.unwrap();
        assert_eq!(ids(&today), vec!["edge"]);

        let three_days = repo.fetch_expiring("h1", as_of, 3, &utc()).await.unwrap();
        assert_eq!(ids(&three_days), vec!["edge", "later"]);

        assert!(repo.fetch_expired("h2", as_of, &utc()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_respects_time_zone() {
        let repo = repo().await;
        repo.create(&item("a", "h1", Some(at(9, 21, 0)), at(1, 0, 0))).await.unwrap();

        // 23:30 UTC on the 9th is already the 10th in UTC+2, whose day began at 22:00 UTC
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let as_of = at(9, 23, 30);
        assert_eq!(ids(&repo.fetch_expired("h1", as_of, &tz).await.unwrap()), vec!["a"]);
        assert!(repo.fetch_expired("h1", as_of, &utc()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sorted_by_expiry_is_fefo() {
        let repo = repo().await;
        repo.create(&item("A", "h1", Some(at(10, 0, 0)), at(1, 0, 0))).await.unwrap();
        repo.create(&item("B", "h1", None, at(2, 0, 0))).await.unwrap();
        repo.create(&item("C", "h1", Some(at(5, 0, 0)), at(3, 0, 0))).await.unwrap();

        let sorted = repo
            .fetch_active_by_household_sorted_by_expiry("h1", at(1, 0, 0), &utc())
            .await
            .unwrap();
        assert_eq!(ids(&sorted), vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_status_filter_and_counts() {
        let repo = repo().await;
        let mut gone = item("gone", "h1", None, at(1, 0, 0));
        gone.transition(ItemStatus::Archived, at(1, 0, 0)).unwrap();
        repo.create(&gone).await.unwrap();
        repo.create(&item("here", "h1", None, at(2, 0, 0))).await.unwrap();

        assert_eq!(repo.count_active("h1").await.unwrap(), 1);
        let archived = repo.fetch_by_household("h1", Some(ItemStatus::Archived)).await.unwrap();
        assert_eq!(ids(&archived), vec!["gone"]);
        assert_eq!(repo.fetch_by_household("h1", None).await.unwrap().len(), 2);

        let summaries = repo.summarize_household("h1").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].batch_count, 2);
        assert_eq!(summaries[0].active_batch_count, 1);
    }

    #[tokio::test]
    async fn test_summarize_one_product() {
        let repo = repo().await;
        repo.create(&item("a", "h1", Some(at(12, 0, 0)), at(1, 0, 0))).await.unwrap();
        let eggs = InventoryDraft::new("h1", "eggs", Quantity::pieces(6.0), "loc1");
        repo.create(&InventoryItem::from_draft("b", eggs, at(2, 0, 0)).unwrap())
            .await
            .unwrap();

        let summary = repo.summarize_by_product("p1", "h1").await.unwrap();
        assert_eq!(summary.batch_count, 1);
        assert_eq!(summary.total_quantity, 1.0);
        assert_eq!(summary.earliest_expiry, Some(at(12, 0, 0)));

        let none = repo.summarize_by_product("flour", "h1").await.unwrap();
        assert_eq!(none, ProductSummary::empty("flour"));
        assert_eq!(repo.summarize_by_product("p1", "h2").await.unwrap().batch_count, 0);
    }
}
