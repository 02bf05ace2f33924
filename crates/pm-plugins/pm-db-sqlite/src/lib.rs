//! # pm-db-sqlite Implementation
//!
//! This crate implements the data mapping between the SQLite relational model
//! and the `pm-core` domain models. Every repository port of `pm-core` is
//! implemented on one [`SqliteStore`].
//!
//! # Developer Note
//! Multi-record writes open their transaction with a write statement, so the
//! SQLite write lock is taken up front and concurrent writers queue behind
//! `busy_timeout` instead of failing on a lock upgrade.

mod access;
mod posts;
mod purchases;
mod users;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use pm_core::models::Item;
use pm_core::traits::ItemRepo;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    pool: SqlitePool,
}

// Helper for UUID conversion
pub(crate) fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

pub(crate) fn blob_to_uuid(blob: &[u8]) -> anyhow::Result<Uuid> {
    Ok(Uuid::from_slice(blob)?)
}

pub(crate) fn uuid_column(row: &SqliteRow, column: &str) -> anyhow::Result<Uuid> {
    blob_to_uuid(row.try_get::<Vec<u8>, _>(column)?.as_slice())
}

impl SqliteStore {
    /// Opens (creating if missing) the database and applies migrations.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::with_max_connections(database_url, 5).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        // Each connection to an in-memory database is its own database, so
        // pin exactly one connection and never recycle it.
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        sqlx::migrate!().run(&pool).await?;

        log::info!("SQLite store ready at {}", database_url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Adds a card to the inventory. Used for seeding; the marketplace
    /// itself never creates items.
    pub async fn insert_item(&self, item: &Item) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO items (id, pokemon_id, name, image, types, rarity, price_per_unit, total_units, available_units, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(item.id))
        .bind(item.pokemon_id)
        .bind(&item.name)
        .bind(&item.image)
        .bind(serde_json::to_string(&item.types)?)
        .bind(&item.rarity)
        .bind(item.price_per_unit)
        .bind(item.total_units)
        .bind(item.available_units)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn item_from_row(row: &SqliteRow) -> anyhow::Result<Item> {
    Ok(Item {
        id: uuid_column(row, "id")?,
        pokemon_id: row.try_get("pokemon_id")?,
        name: row.try_get("name")?,
        image: row.try_get("image")?,
        types: serde_json::from_str(&row.try_get::<String, _>("types")?)?,
        rarity: row.try_get("rarity")?,
        price_per_unit: row.try_get("price_per_unit")?,
        total_units: row.try_get("total_units")?,
        available_units: row.try_get("available_units")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ItemRepo for SqliteStore {
    async fn list_items(&self) -> anyhow::Result<Vec<Item>> {
        let rows = sqlx::query("SELECT * FROM items ORDER BY pokemon_id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn get_item(&self, id: Uuid) -> anyhow::Result<Option<Item>> {
        let row = sqlx::query("SELECT * FROM items WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(item_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_insert_and_get_item() {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let item = Item {
            id: Uuid::now_v7(),
            pokemon_id: 150,
            name: "Mewtwo".into(),
            image: "mewtwo.png".into(),
            types: vec!["psychic".into()],
            rarity: "legendary".into(),
            price_per_unit: 100,
            total_units: 3,
            available_units: 3,
            created_at: now,
            updated_at: now,
        };
        store.insert_item(&item).await.expect("Failed to insert item");

        let loaded = store.get_item(item.id).await.unwrap().expect("item exists");
        assert_eq!(loaded.name, "Mewtwo");
        assert_eq!(loaded.types, vec!["psychic".to_string()]);
        assert_eq!(store.list_items().await.unwrap().len(), 1);
        assert!(store.get_item(Uuid::now_v7()).await.unwrap().is_none());
    }

    #[test]
    fn test_blob_round_trip_rejects_short_blobs() {
        let id = Uuid::now_v7();
        assert_eq!(blob_to_uuid(&uuid_to_blob(id)).unwrap(), id);
        assert!(blob_to_uuid(&[1, 2, 3]).is_err());
    }
}
