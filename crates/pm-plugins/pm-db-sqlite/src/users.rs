use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pm_core::models::{ActivityCounter, OwnedItem, User, UserProfile};
use pm_core::traits::UserRepo;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::{uuid_column, SqliteStore};

fn owned_item_from_row(row: &SqliteRow) -> anyhow::Result<OwnedItem> {
    Ok(OwnedItem {
        item_id: uuid_column(row, "item_id")?,
        item_name: row.try_get("item_name")?,
        units: row.try_get("units")?,
        acquired_at: row.try_get("acquired_at")?,
    })
}

fn user_from_row(row: &SqliteRow, owned_items: Vec<OwnedItem>) -> anyhow::Result<User> {
    Ok(User {
        telegram_id: row.try_get("telegram_id")?,
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        owned_items,
        total_purchases: row.try_get("total_purchases")?,
        total_spent: row.try_get("total_spent")?,
        posts_count: row.try_get("posts_count")?,
        promotions_made: row.try_get("promotions_made")?,
        role: row.try_get("role")?,
        is_banned: row.try_get("is_banned")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_active: row.try_get("last_active")?,
    })
}

impl SqliteStore {
    async fn owned_items(&self, telegram_id: i64) -> anyhow::Result<Vec<OwnedItem>> {
        let rows = sqlx::query(
            "SELECT item_id, item_name, units, acquired_at FROM owned_items WHERE telegram_id = ? ORDER BY rowid ASC",
        )
        .bind(telegram_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(owned_item_from_row).collect()
    }
}

#[async_trait]
impl UserRepo for SqliteStore {
    async fn upsert_profile(&self, profile: &UserProfile, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO users (telegram_id, username, first_name, last_name, created_at, updated_at, last_active) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(profile.telegram_id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let created = inserted.rows_affected() == 1;
        if !created {
            // Aggregates and role are never touched by a profile refresh.
            sqlx::query(
                "UPDATE users SET username = ?, first_name = ?, last_name = ?, updated_at = ?, last_active = ? \
                 WHERE telegram_id = ?",
            )
            .bind(&profile.username)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(now)
            .bind(now)
            .bind(profile.telegram_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn get_user(&self, telegram_id: i64) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE telegram_id = ?")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let owned = self.owned_items(telegram_id).await?;
                Ok(Some(user_from_row(&row, owned)?))
            }
            None => Ok(None),
        }
    }

    async fn top_by_spent(&self, limit: i64) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY total_spent DESC, telegram_id ASC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut users = Vec::with_capacity(rows.len());
        for row in &rows {
            let telegram_id: i64 = row.try_get("telegram_id")?;
            let owned = self.owned_items(telegram_id).await?;
            users.push(user_from_row(row, owned)?);
        }
        Ok(users)
    }

    async fn bump_activity(
        &self,
        telegram_id: i64,
        username: &str,
        counter: ActivityCounter,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let (posts, promotions) = match counter {
            ActivityCounter::Posts => (1_i64, 0_i64),
            ActivityCounter::Promotions => (0, 1),
        };

        sqlx::query(
            "INSERT INTO users (telegram_id, username, posts_count, promotions_made, created_at, updated_at, last_active) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(telegram_id) DO UPDATE SET \
                username = CASE WHEN excluded.username = '' THEN users.username ELSE excluded.username END, \
                posts_count = users.posts_count + excluded.posts_count, \
                promotions_made = users.promotions_made + excluded.promotions_made, \
                updated_at = excluded.updated_at, \
                last_active = excluded.last_active",
        )
        .bind(telegram_id)
        .bind(username)
        .bind(posts)
        .bind(promotions)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
