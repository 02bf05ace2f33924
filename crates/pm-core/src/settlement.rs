//! # Settlement Engine
//!
//! Issues Telegram Stars invoices for cards and applies captured payments.
//!
//! Invoice creation only performs an advisory availability check: two
//! concurrent invoices for the last units can both be issued. The
//! authoritative, invariant-enforcing point is the guarded decrement made
//! by `PurchaseLedger::settle`, which claims the pending purchase, takes the
//! units and credits the payer in one store transaction.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    Invoice, InvoiceRequest, LineItem, PaymentCapture, PaymentStatus, PurchaseRecord,
    PurchaseStatus,
};
use crate::store::{bounded, StoreSettings};
use crate::traits::{BotGateway, ItemRepo, PurchaseLedger, SettlementOutcome};

/// Random bytes behind an invoice correlation token.
pub const INVOICE_TOKEN_BYTES: usize = 16;

pub struct SettlementEngine {
    items: Arc<dyn ItemRepo>,
    purchases: Arc<dyn PurchaseLedger>,
    bot: Arc<dyn BotGateway>,
    settings: StoreSettings,
}

impl SettlementEngine {
    pub fn new(
        items: Arc<dyn ItemRepo>,
        purchases: Arc<dyn PurchaseLedger>,
        bot: Arc<dyn BotGateway>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            items,
            purchases,
            bot,
            settings,
        }
    }

    /// Records a pending purchase and asks the bot to present the invoice.
    ///
    /// A delivery failure leaves the pending record in place; it is never
    /// settled and can be pruned.
    pub async fn create_invoice(&self, user_id: i64, item_id: Uuid, units: i64) -> Result<Invoice> {
        if units < 1 {
            return Err(AppError::InvalidInput("units must be at least 1".into()));
        }
        if user_id <= 0 {
            return Err(AppError::InvalidInput("invalid user ID".into()));
        }

        let item = bounded(self.settings.timeout, "load item", self.items.get_item(item_id))
            .await?
            .ok_or_else(|| AppError::not_found("Item", item_id))?;

        if item.available_units < units {
            return Err(AppError::InsufficientInventory {
                requested: units,
                available: item.available_units,
            });
        }

        let total_price = item
            .price_per_unit
            .checked_mul(units)
            .ok_or_else(|| AppError::InvalidInput("total price overflows".into()))?;

        let invoice_token = generate_invoice_token()?;
        let now = Utc::now();
        let purchase = PurchaseRecord {
            id: Uuid::now_v7(),
            user_id,
            username: String::new(),
            item_id: item.id,
            item_name: item.name.clone(),
            units,
            total_price,
            status: PurchaseStatus::Pending,
            external_charge_id: None,
            invoice_token: invoice_token.clone(),
            created_at: now,
            updated_at: now,
        };

        bounded(
            self.settings.timeout,
            "insert pending purchase",
            self.purchases.insert_pending(&purchase),
        )
        .await?;

        let request = InvoiceRequest {
            user_id,
            title: format!("{} Pokemon Card", item.name),
            description: format!("Purchase {} units of {} Pokemon card", units, item.name),
            invoice_token: invoice_token.clone(),
            line_items: vec![LineItem {
                label: format!("{} x{}", item.name, units),
                amount: total_price,
            }],
        };

        let invoice_link = self.bot.deliver_invoice(&request).await.map_err(|e| {
            log::warn!(
                "Invoice delivery failed for user {} (token {}): {:#}",
                user_id,
                invoice_token,
                e
            );
            AppError::Gateway(format!("failed to send invoice: {e:#}"))
        })?;

        log::info!(
            "Invoice created for user {}: {} x{} ({} stars)",
            user_id,
            item.name,
            units,
            total_price
        );

        Ok(Invoice {
            invoice_link,
            invoice_token,
            total_price,
        })
    }

    /// Applies a captured payment exactly once.
    ///
    /// A token with no pending purchase yields `AlreadyProcessed`; the
    /// provider re-delivers captures, so callers treat it as a no-op.
    pub async fn settle_successful_payment(&self, capture: &PaymentCapture) -> Result<PurchaseRecord> {
        if capture.invoice_token.is_empty() {
            return Err(AppError::InvalidInput("invoice token is required".into()));
        }

        let outcome = bounded(
            self.settings.timeout,
            "settle payment",
            self.purchases.settle(capture),
        )
        .await?;

        match outcome {
            SettlementOutcome::Settled(purchase) => {
                log::info!(
                    "Payment settled for user {}: {} ({} units, charge {})",
                    capture.user_id,
                    purchase.item_name,
                    purchase.units,
                    capture.external_charge_id
                );
                Ok(purchase)
            }
            SettlementOutcome::NotPending => {
                log::info!(
                    "Ignoring capture for token {}: purchase not found or already processed",
                    capture.invoice_token
                );
                Err(AppError::AlreadyProcessed(capture.invoice_token.clone()))
            }
            SettlementOutcome::Oversold { purchase, available } => {
                log::error!(
                    "OVERSOLD: payment captured but inventory exhausted; manual reconciliation required \
                     (token {}, charge {}, user {}, item {}, requested {}, available {:?})",
                    capture.invoice_token,
                    capture.external_charge_id,
                    capture.user_id,
                    purchase.item_id,
                    purchase.units,
                    available
                );
                Err(AppError::InvariantViolation(format!(
                    "item {} cannot cover {} units for invoice {}",
                    purchase.item_id, purchase.units, capture.invoice_token
                )))
            }
        }
    }

    /// Bot entry point for a successful payment message.
    ///
    /// Settles, then tells the user how it went. Duplicate deliveries stay
    /// silent. Every other failure is escalated in the log and the user only
    /// receives the generic apology.
    pub async fn handle_payment_captured(
        &self,
        capture: &PaymentCapture,
        chat_id: i64,
    ) -> Result<PurchaseRecord> {
        let result = self.settle_successful_payment(capture).await;
        match &result {
            Ok(_) => self.notify(chat_id, true).await,
            Err(AppError::AlreadyProcessed(_)) => {}
            Err(e) => {
                log::error!(
                    "Settlement failed after capture (token {}, charge {}, user {}): {}",
                    capture.invoice_token,
                    capture.external_charge_id,
                    capture.user_id,
                    e
                );
                self.notify(chat_id, false).await;
            }
        }
        result
    }

    /// Approves a pre-checkout query. Inventory is re-checked at settlement.
    pub async fn pre_checkout(&self, query_id: &str) -> Result<()> {
        self.bot
            .answer_pre_checkout(query_id, true, None)
            .await
            .map_err(|e| AppError::Gateway(format!("failed to answer pre-checkout query: {e:#}")))
    }

    pub async fn get_payment_status(&self, invoice_token: &str) -> Result<PaymentStatus> {
        let purchase = bounded(
            self.settings.timeout,
            "load purchase",
            self.purchases.find_by_token(invoice_token),
        )
        .await?
        .ok_or_else(|| AppError::not_found("Purchase", invoice_token))?;

        let completed_at = match purchase.status {
            PurchaseStatus::Completed => Some(purchase.updated_at),
            _ => None,
        };

        Ok(PaymentStatus {
            status: purchase.status,
            purchase_id: purchase.id,
            completed_at,
        })
    }

    pub async fn user_purchases(&self, user_id: i64) -> Result<Vec<PurchaseRecord>> {
        bounded(
            self.settings.timeout,
            "list user purchases",
            self.purchases.completed_for_user(user_id),
        )
        .await
    }

    async fn notify(&self, chat_id: i64, succeeded: bool) {
        if let Err(e) = self.bot.notify_payment_outcome(chat_id, succeeded).await {
            log::warn!("Failed to notify chat {} of payment outcome: {:#}", chat_id, e);
        }
    }
}

/// Hex-encoded token from the OS CSPRNG.
pub fn generate_invoice_token() -> Result<String> {
    let mut buf = [0u8; INVOICE_TOKEN_BYTES];
    getrandom::getrandom(&mut buf)
        .map_err(|e| AppError::Internal(format!("random source unavailable: {e}")))?;
    Ok(hex::encode(buf))
}
