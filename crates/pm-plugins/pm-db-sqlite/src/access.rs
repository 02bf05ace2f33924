use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pm_core::models::{AccessStats, DailyAccess, PageAccess};
use pm_core::traits::AccessRepo;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::{uuid_column, uuid_to_blob, SqliteStore};

fn access_from_row(row: &SqliteRow) -> anyhow::Result<PageAccess> {
    Ok(PageAccess {
        id: uuid_column(row, "id")?,
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        page_url: row.try_get("page_url")?,
        user_agent: row.try_get("user_agent")?,
        ip_address: row.try_get("ip_address")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl AccessRepo for SqliteStore {
    async fn exists_since(
        &self,
        user_id: i64,
        page_url: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM page_accesses WHERE user_id = ? AND page_url = ? AND created_at >= ?)",
        )
        .bind(user_id)
        .bind(page_url)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(found != 0)
    }

    async fn insert_access(&self, access: &PageAccess) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO page_accesses (id, user_id, username, first_name, last_name, page_url, user_agent, ip_address, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(access.id))
        .bind(access.user_id)
        .bind(&access.username)
        .bind(&access.first_name)
        .bind(&access.last_name)
        .bind(&access.page_url)
        .bind(&access.user_agent)
        .bind(&access.ip_address)
        .bind(access.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stats(&self, recent_since: DateTime<Utc>) -> anyhow::Result<AccessStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(DISTINCT user_id) AS users, \
             COALESCE(SUM(CASE WHEN created_at >= ? THEN 1 ELSE 0 END), 0) AS recent \
             FROM page_accesses",
        )
        .bind(recent_since)
        .fetch_one(&self.pool)
        .await?;

        Ok(AccessStats {
            total_accesses: row.try_get("total")?,
            unique_users: row.try_get("users")?,
            last_24_hours: row.try_get("recent")?,
        })
    }

    async fn history(&self, user_id: i64, limit: i64) -> anyhow::Result<Vec<PageAccess>> {
        let rows = sqlx::query(
            "SELECT * FROM page_accesses WHERE user_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(access_from_row).collect()
    }

    async fn daily(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<DailyAccess>> {
        let rows = sqlx::query(
            "SELECT substr(created_at, 1, 10) AS day, COUNT(*) AS count, COUNT(DISTINCT user_id) AS users \
             FROM page_accesses WHERE created_at >= ? GROUP BY day ORDER BY day DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DailyAccess {
                    date: row.try_get("day")?,
                    count: row.try_get("count")?,
                    unique_users: row.try_get("users")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn visit(user_id: i64, page: &str, at: DateTime<Utc>) -> PageAccess {
        PageAccess {
            id: Uuid::now_v7(),
            user_id,
            username: "oak".into(),
            first_name: String::new(),
            last_name: String::new(),
            page_url: page.into(),
            user_agent: String::new(),
            ip_address: String::new(),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_stats_and_recent_window() {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        store.insert_access(&visit(1, "/", now - Duration::days(3))).await.unwrap();
        store.insert_access(&visit(1, "/shop", now)).await.unwrap();
        store.insert_access(&visit(2, "/", now)).await.unwrap();

        let stats = store.stats(now - Duration::hours(24)).await.unwrap();
        assert_eq!(stats.total_accesses, 3);
        assert_eq!(stats.unique_users, 2);
        assert_eq!(stats.last_24_hours, 2);

        assert!(store.exists_since(1, "/shop", now - Duration::minutes(5)).await.unwrap());
        assert!(!store.exists_since(1, "/", now - Duration::minutes(5)).await.unwrap());

        let history = store.history(1, 1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].page_url, "/shop");
    }

    #[tokio::test]
    async fn test_daily_groups_by_utc_day_newest_first() {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        store.insert_access(&visit(1, "/", now - Duration::days(2))).await.unwrap();
        store.insert_access(&visit(1, "/", now)).await.unwrap();
        store.insert_access(&visit(2, "/", now)).await.unwrap();

        let days = store.daily(now - Duration::days(7)).await.unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, now.format("%Y-%m-%d").to_string());
        assert_eq!(days[0].count, 2);
        assert_eq!(days[0].unique_users, 2);
    }
}
