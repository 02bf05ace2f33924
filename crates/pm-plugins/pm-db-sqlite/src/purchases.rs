use async_trait::async_trait;
use chrono::Utc;
use pm_core::models::{PaymentCapture, PurchaseRecord, PurchaseStatus};
use pm_core::traits::{PurchaseLedger, SettlementOutcome};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::{uuid_column, uuid_to_blob, SqliteStore};

fn purchase_from_row(row: &SqliteRow) -> anyhow::Result<PurchaseRecord> {
    let status: String = row.try_get("status")?;
    Ok(PurchaseRecord {
        id: uuid_column(row, "id")?,
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        item_id: uuid_column(row, "item_id")?,
        item_name: row.try_get("item_name")?,
        units: row.try_get("units")?,
        total_price: row.try_get("total_price")?,
        status: status.parse().map_err(anyhow::Error::msg)?,
        external_charge_id: row.try_get("external_charge_id")?,
        invoice_token: row.try_get("invoice_token")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl PurchaseLedger for SqliteStore {
    async fn insert_pending(&self, purchase: &PurchaseRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO purchases (id, user_id, username, item_id, item_name, units, total_price, status, external_charge_id, invoice_token, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(purchase.id))
        .bind(purchase.user_id)
        .bind(&purchase.username)
        .bind(uuid_to_blob(purchase.item_id))
        .bind(&purchase.item_name)
        .bind(purchase.units)
        .bind(purchase.total_price)
        .bind(purchase.status.as_str())
        .bind(&purchase.external_charge_id)
        .bind(&purchase.invoice_token)
        .bind(purchase.created_at)
        .bind(purchase.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_token(&self, invoice_token: &str) -> anyhow::Result<Option<PurchaseRecord>> {
        let row = sqlx::query("SELECT * FROM purchases WHERE invoice_token = ?")
            .bind(invoice_token)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(purchase_from_row).transpose()
    }

    async fn completed_for_user(&self, user_id: i64) -> anyhow::Result<Vec<PurchaseRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM purchases WHERE user_id = ? AND status = 'completed' ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(purchase_from_row).collect()
    }

    async fn settle(&self, capture: &PaymentCapture) -> anyhow::Result<SettlementOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Only the first settler sees the pending row; later ones match nothing.
        let claimed = sqlx::query(
            "UPDATE purchases SET status = 'completed', external_charge_id = ?, username = ?, user_id = ?, updated_at = ? \
             WHERE invoice_token = ? AND status = 'pending'",
        )
        .bind(&capture.external_charge_id)
        .bind(&capture.username)
        .bind(capture.user_id)
        .bind(now)
        .bind(&capture.invoice_token)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(SettlementOutcome::NotPending);
        }

        let row = sqlx::query("SELECT * FROM purchases WHERE invoice_token = ?")
            .bind(&capture.invoice_token)
            .fetch_one(&mut *tx)
            .await?;
        let mut purchase = purchase_from_row(&row)?;

        let taken = sqlx::query(
            "UPDATE items SET available_units = available_units - ?, updated_at = ? \
             WHERE id = ? AND available_units >= ?",
        )
        .bind(purchase.units)
        .bind(now)
        .bind(uuid_to_blob(purchase.item_id))
        .bind(purchase.units)
        .execute(&mut *tx)
        .await?;

        if taken.rows_affected() == 0 {
            let available: Option<i64> =
                sqlx::query_scalar("SELECT available_units FROM items WHERE id = ?")
                    .bind(uuid_to_blob(purchase.item_id))
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            purchase.status = PurchaseStatus::Pending;
            return Ok(SettlementOutcome::Oversold { purchase, available });
        }

        sqlx::query(
            "INSERT INTO users (telegram_id, username, total_purchases, total_spent, created_at, updated_at, last_active) \
             VALUES (?, ?, 1, ?, ?, ?, ?) \
             ON CONFLICT(telegram_id) DO UPDATE SET \
                total_purchases = users.total_purchases + 1, \
                total_spent = users.total_spent + excluded.total_spent, \
                updated_at = excluded.updated_at, \
                last_active = excluded.last_active",
        )
        .bind(capture.user_id)
        .bind(&capture.username)
        .bind(purchase.total_price)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO owned_items (telegram_id, item_id, item_name, units, acquired_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(capture.user_id)
        .bind(uuid_to_blob(purchase.item_id))
        .bind(&purchase.item_name)
        .bind(purchase.units)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        log::debug!(
            "Settled purchase {} ({} x{})",
            purchase.id,
            purchase.item_name,
            purchase.units
        );
        Ok(SettlementOutcome::Settled(purchase))
    }
}
