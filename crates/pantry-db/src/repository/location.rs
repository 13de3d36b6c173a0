//! Storage location repository.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use pantry_core::ports::{LocationRemoval, LocationStore};
use pantry_core::{RepositoryResult, StorageLocation};

use super::{from_millis, to_millis};
use crate::error::DbResult;

const ENTITY: &str = "storage_location";

/// Repository for household storage locations.
#[derive(Debug, Clone)]
pub struct LocationRepository {
    pool: SqlitePool,
}

impl LocationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LocationRepository { pool }
    }

    /// Inserts or renames a location. The owning household never changes.
    pub async fn save(&self, location: &StorageLocation) -> DbResult<()> {
        debug!(location_id = %location.id, name = %location.name, "Saving storage location");

        sqlx::query(
            r#"
            INSERT INTO storage_locations (id, household_id, name, is_cold, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                is_cold = excluded.is_cold,
                updated_at = excluded.updated_at
            WHERE storage_locations.household_id = excluded.household_id
            "#,
        )
        .bind(&location.id)
        .bind(&location.household_id)
        .bind(&location.name)
        .bind(location.is_cold)
        .bind(to_millis(location.created_at))
        .bind(to_millis(location.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find(&self, id: &str, household_id: &str) -> DbResult<Option<StorageLocation>> {
        let row = sqlx::query(
            r#"
            SELECT id, household_id, name, is_cold, created_at, updated_at
            FROM storage_locations
            WHERE id = ?1 AND household_id = ?2
            "#,
        )
        .bind(id)
        .bind(household_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode).transpose()
    }

    /// Locations of the household ordered by name.
    pub async fn list(&self, household_id: &str) -> DbResult<Vec<StorageLocation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, household_id, name, is_cold, created_at, updated_at
            FROM storage_locations
            WHERE household_id = ?1
            ORDER BY name COLLATE NOCASE ASC, id ASC
            "#,
        )
        .bind(household_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode).collect()
    }

    /// Items of any status stored at the location.
    pub async fn count_items_at(&self, id: &str, household_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM inventory_items WHERE household_id = ?1 AND storage_location_id = ?2",
        )
        .bind(household_id)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Deletes the location unless an item references it.
    ///
    /// The reference check is part of the DELETE, so an item written
    /// concurrently either blocks the delete or fails its own location check.
    pub async fn delete_if_unused(&self, id: &str, household_id: &str) -> DbResult<LocationRemoval> {
        let result = sqlx::query(
            r#"
            DELETE FROM storage_locations
            WHERE id = ?1 AND household_id = ?2
              AND NOT EXISTS (
                  SELECT 1 FROM inventory_items
                  WHERE household_id = ?2 AND storage_location_id = ?1
              )
            "#,
        )
        .bind(id)
        .bind(household_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(LocationRemoval::Deleted);
        }
        // Nothing deleted; report why.
        match self.count_items_at(id, household_id).await? {
            0 => Ok(LocationRemoval::NotFound),
            items => Ok(LocationRemoval::InUse { items }),
        }
    }
}

fn decode(row: &SqliteRow) -> DbResult<StorageLocation> {
    let id: String = row.try_get("id")?;
    Ok(StorageLocation {
        household_id: row.try_get("household_id")?,
        name: row.try_get("name")?,
        is_cold: row.try_get("is_cold")?,
        created_at: from_millis(ENTITY, &id, row.try_get("created_at")?)?,
        updated_at: from_millis(ENTITY, &id, row.try_get("updated_at")?)?,
        id,
    })
}

#[async_trait]
impl LocationStore for LocationRepository {
    async fn save(&self, location: &StorageLocation) -> RepositoryResult<()> {
        Ok(LocationRepository::save(self, location).await?)
    }

    async fn find(&self, id: &str, household_id: &str) -> RepositoryResult<Option<StorageLocation>> {
        Ok(LocationRepository::find(self, id, household_id).await?)
    }

    async fn list(&self, household_id: &str) -> RepositoryResult<Vec<StorageLocation>> {
        Ok(LocationRepository::list(self, household_id).await?)
    }

    async fn count_items_at(&self, id: &str, household_id: &str) -> RepositoryResult<i64> {
        Ok(LocationRepository::count_items_at(self, id, household_id).await?)
    }

    async fn delete_if_unused(&self, id: &str, household_id: &str) -> RepositoryResult<LocationRemoval> {
        Ok(LocationRepository::delete_if_unused(self, id, household_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::{TimeZone, Utc};
    use pantry_core::{InventoryDraft, InventoryItem, ItemStatus, Quantity};

    #[tokio::test]
    async fn test_save_find_list_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.locations();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let fridge = StorageLocation::new("fridge", "h1", "Fridge", true, now).unwrap();
        let shelf = StorageLocation::new("shelf", "h1", "attic shelf", false, now).unwrap();
        repo.save(&fridge).await.unwrap();
        repo.save(&shelf).await.unwrap();

        assert_eq!(repo.find("fridge", "h1").await.unwrap(), Some(fridge));
        assert_eq!(repo.find("fridge", "h2").await.unwrap(), None);

        let names: Vec<String> = repo.list("h1").await.unwrap().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["attic shelf", "Fridge"]);

        assert_eq!(repo.count_items_at("fridge", "h1").await.unwrap(), 0);
        assert_eq!(repo.delete_if_unused("fridge", "h2").await.unwrap(), LocationRemoval::NotFound);
        assert_eq!(repo.delete_if_unused("fridge", "h1").await.unwrap(), LocationRemoval::Deleted);
        assert_eq!(repo.find("fridge", "h1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_refuses_referenced_location() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.locations();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        repo.save(&StorageLocation::new("fridge", "h1", "Fridge", true, now).unwrap())
            .await
            .unwrap();

        let draft = InventoryDraft::new("h1", "milk", Quantity::pieces(1.0), "fridge");
        let mut item = InventoryItem::from_draft("i1", draft, now).unwrap();
        item.transition(ItemStatus::Consumed, now).unwrap();
        db.inventory().create(&item).await.unwrap();

        assert_eq!(
            repo.delete_if_unused("fridge", "h1").await.unwrap(),
            LocationRemoval::InUse { items: 1 }
        );
        assert!(repo.find("fridge", "h1").await.unwrap().is_some());
    }
}
