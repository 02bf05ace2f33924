//! Telegram webhook intake.
//!
//! Only the update parts the marketplace reacts to are modelled; everything
//! else in the update is ignored by serde.

use actix_web::{web, HttpRequest, HttpResponse};
use pm_core::{AppError, PaymentCapture};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::handlers::State;

pub const SECRET_TOKEN_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub pre_checkout_query: Option<PreCheckoutQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: Option<TelegramUser>,
    pub successful_payment: Option<SuccessfulPayment>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuccessfulPayment {
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
    pub telegram_payment_charge_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PreCheckoutQuery {
    pub id: String,
    pub from: TelegramUser,
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
}

impl Message {
    /// The capture carried by a successful-payment message, if any.
    pub fn payment_capture(&self) -> Option<PaymentCapture> {
        let payment = self.successful_payment.as_ref()?;
        let (user_id, username) = match &self.from {
            Some(from) => (from.id, from.username.clone().unwrap_or_default()),
            None => (self.chat.id, String::new()),
        };
        Some(PaymentCapture {
            invoice_token: payment.invoice_payload.clone(),
            user_id,
            username,
            external_charge_id: payment.telegram_payment_charge_id.clone(),
        })
    }
}

fn check_secret(req: &HttpRequest, expected: Option<&str>) -> ApiResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let supplied = req
        .headers()
        .get(SECRET_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if supplied != Some(expected) {
        log::warn!("Rejected webhook call with missing or wrong secret token");
        return Err(ApiError(AppError::Forbidden("invalid webhook secret".into())));
    }
    Ok(())
}

/// Dispatches one update. Once the update parses the answer is always
/// `200 {"status":"ok"}`; settlement outcomes reach the user through the bot.
pub async fn handle_update(
    data: State,
    req: HttpRequest,
    body: web::Json<Update>,
) -> ApiResult<HttpResponse> {
    check_secret(&req, data.webhook_secret.as_deref())?;
    let settlement = data.settlement()?;
    let update = body.into_inner();

    if let Some(message) = &update.message {
        if let Some(capture) = message.payment_capture() {
            log::info!(
                "Received successful payment from user {} (update {})",
                capture.user_id,
                update.update_id
            );
            // Failures are logged and answered to the user inside the engine.
            if let Err(e) = settlement
                .handle_payment_captured(&capture, message.chat.id)
                .await
            {
                log::debug!("Update {} finished with {}", update.update_id, e);
            }
        }
    }

    if let Some(query) = &update.pre_checkout_query {
        log::info!(
            "Received pre-checkout query {} from user {} ({} {})",
            query.id,
            query.from.id,
            query.total_amount,
            query.currency
        );
        if let Err(e) = settlement.pre_checkout(&query.id).await {
            log::error!("Error answering pre-checkout query {}: {}", query.id, e);
        }
    }

    Ok(HttpResponse::Ok().json(json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_payment_update_parses() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "date": 1700000000,
                "chat": { "id": 42, "type": "private" },
                "from": { "id": 42, "is_bot": false, "first_name": "Ash", "username": "ash" },
                "successful_payment": {
                    "currency": "XTR",
                    "total_amount": 20,
                    "invoice_payload": "abc123",
                    "telegram_payment_charge_id": "tg-charge-1",
                    "provider_payment_charge_id": ""
                }
            }
        }))
        .unwrap();

        let capture = update.message.unwrap().payment_capture().unwrap();
        assert_eq!(capture.invoice_token, "abc123");
        assert_eq!(capture.user_id, 42);
        assert_eq!(capture.username, "ash");
        assert_eq!(capture.external_charge_id, "tg-charge-1");
    }

    #[test]
    fn test_plain_message_carries_no_capture() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 11,
            "message": { "chat": { "id": 1 }, "text": "/start" }
        }))
        .unwrap();
        assert!(update.message.unwrap().payment_capture().is_none());
    }
}
