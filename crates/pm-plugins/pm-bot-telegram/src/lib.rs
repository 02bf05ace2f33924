//! # pm-bot-telegram
//!
//! `BotGateway` implementation over the Telegram Bot HTTP API. Invoices are
//! priced in Telegram Stars (`XTR`), which need no payment provider token.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use pm_core::models::{InvoiceRequest, LineItem};
use pm_core::traits::BotGateway;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const API_BASE: &str = "https://api.telegram.org";
const STARS_CURRENCY: &str = "XTR";

pub const PAYMENT_SUCCEEDED_TEXT: &str =
    "✅ Payment successful! Your Pokemon cards have been added to your collection.";
pub const PAYMENT_FAILED_TEXT: &str =
    "❌ Sorry, there was an error processing your payment. Please contact support.";

#[derive(Debug, Serialize)]
struct SendInvoice<'a> {
    chat_id: i64,
    title: &'a str,
    description: &'a str,
    payload: &'a str,
    provider_token: &'a str,
    currency: &'a str,
    prices: &'a [LineItem],
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct AnswerPreCheckoutQuery<'a> {
    pre_checkout_query_id: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SetWebhook<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_token: Option<&'a str>,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct GetMe {}

/// The bot's own account, as reported by `getMe`.
#[derive(Debug, Deserialize)]
struct BotAccount {
    username: Option<String>,
}

impl BotAccount {
    fn into_username(self) -> anyhow::Result<String> {
        self.username
            .map(|u| u.trim_start_matches('@').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow!("telegram getMe reported no bot username"))
    }
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> anyhow::Result<T> {
        if !self.ok {
            return Err(anyhow!(
                "telegram {} failed ({}): {}",
                method,
                self.error_code.unwrap_or_default(),
                self.description.unwrap_or_else(|| "no description".into())
            ));
        }
        self.result
            .ok_or_else(|| anyhow!("telegram {} returned ok without a result", method))
    }
}

pub struct TelegramBot {
    client: Client,
    base_url: String,
    bot_username: String,
}

impl TelegramBot {
    pub fn new(token: &str, bot_username: &str, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_api_base(API_BASE, token, bot_username, timeout)
    }

    /// Points the client at a different Bot API server (local server, tests).
    pub fn with_api_base(
        api_base: &str,
        token: &str,
        bot_username: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        if token.trim().is_empty() {
            return Err(anyhow!("telegram bot token is empty"));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build telegram HTTP client")?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            bot_username: bot_username.trim_start_matches('@').to_string(),
        })
    }

    pub fn bot_username(&self) -> &str {
        &self.bot_username
    }

    /// Fills in the bot username from `getMe` when none was configured.
    /// Invoice deep links are unusable without it.
    pub async fn resolve_username(&mut self) -> anyhow::Result<()> {
        if !self.bot_username.is_empty() {
            return Ok(());
        }
        let account: BotAccount = self.call("getMe", &GetMe {}).await?;
        self.bot_username = account.into_username()?;
        Ok(())
    }

    /// Deep link that opens the bot chat holding the invoice.
    pub fn invoice_link(&self, invoice_token: &str) -> String {
        format!("https://t.me/{}?start=invoice_{}", self.bot_username, invoice_token)
    }

    /// Registers the webhook endpoint for payment and pre-checkout updates.
    pub async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> anyhow::Result<()> {
        let ok: bool = self
            .call(
                "setWebhook",
                &SetWebhook {
                    url,
                    secret_token,
                    allowed_updates: &["message", "pre_checkout_query"],
                },
            )
            .await?;
        if !ok {
            return Err(anyhow!("telegram refused webhook {}", url));
        }
        log::info!("Webhook set to {}", url);
        Ok(())
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> anyhow::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);
        // Telegram reports failures in the body, also on non-2xx statuses.
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("telegram {} request failed", method))?;

        let status = response.status();
        let envelope = response
            .json::<ApiResponse<T>>()
            .await
            .with_context(|| format!("telegram {} returned unreadable body (HTTP {})", method, status))?;
        envelope.into_result(method)
    }
}

#[async_trait]
impl BotGateway for TelegramBot {
    async fn deliver_invoice(&self, request: &InvoiceRequest) -> anyhow::Result<String> {
        let _message: serde_json::Value = self
            .call(
                "sendInvoice",
                &SendInvoice {
                    chat_id: request.user_id,
                    title: &request.title,
                    description: &request.description,
                    payload: &request.invoice_token,
                    provider_token: "",
                    currency: STARS_CURRENCY,
                    prices: &request.line_items,
                },
            )
            .await?;
        Ok(self.invoice_link(&request.invoice_token))
    }

    async fn notify_payment_outcome(&self, chat_id: i64, succeeded: bool) -> anyhow::Result<()> {
        let text = if succeeded {
            PAYMENT_SUCCEEDED_TEXT
        } else {
            PAYMENT_FAILED_TEXT
        };
        let _message: serde_json::Value = self
            .call("sendMessage", &SendMessage { chat_id, text })
            .await?;
        Ok(())
    }

    async fn answer_pre_checkout(
        &self,
        query_id: &str,
        ok: bool,
        error_message: Option<String>,
    ) -> anyhow::Result<()> {
        let answered: bool = self
            .call(
                "answerPreCheckoutQuery",
                &AnswerPreCheckoutQuery {
                    pre_checkout_query_id: query_id,
                    ok,
                    error_message: error_message.as_deref(),
                },
            )
            .await?;
        if !answered {
            return Err(anyhow!("pre-checkout query {} was not answered", query_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bot() -> TelegramBot {
        TelegramBot::new("123:abc", "@petamini_bot", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_invoice_link_uses_deep_link() {
        assert_eq!(
            bot().invoice_link("deadbeef"),
            "https://t.me/petamini_bot?start=invoice_deadbeef"
        );
        assert_eq!(bot().base_url, "https://api.telegram.org/bot123:abc");
    }

    #[test]
    fn test_configured_username_drops_at_sign() {
        assert_eq!(bot().bot_username(), "petamini_bot");
        let unnamed = TelegramBot::new("123:abc", "", Duration::from_secs(5)).unwrap();
        assert_eq!(unnamed.bot_username(), "");
    }

    #[tokio::test]
    async fn test_resolve_username_skips_lookup_when_configured() {
        // Any network call would fail against this base.
        let mut named = TelegramBot::with_api_base(
            "http://127.0.0.1:9",
            "123:abc",
            "petamini_bot",
            Duration::from_millis(200),
        )
        .unwrap();
        named.resolve_username().await.unwrap();
        assert_eq!(named.invoice_link("ab"), "https://t.me/petamini_bot?start=invoice_ab");

        let mut unnamed =
            TelegramBot::with_api_base("http://127.0.0.1:9", "123:abc", "", Duration::from_millis(200))
                .unwrap();
        assert!(unnamed.resolve_username().await.is_err());
        assert_eq!(unnamed.bot_username(), "");
    }

    #[test]
    fn test_get_me_username_parsing() {
        let me: ApiResponse<BotAccount> = serde_json::from_value(json!({
            "ok": true,
            "result": { "id": 1, "is_bot": true, "first_name": "Peta", "username": "petamini_bot" }
        }))
        .unwrap();
        assert_eq!(me.into_result("getMe").unwrap().into_username().unwrap(), "petamini_bot");

        let anonymous: BotAccount = serde_json::from_value(json!({ "id": 1, "is_bot": true })).unwrap();
        assert!(anonymous.into_username().is_err());
    }

    #[test]
    fn test_empty_token_is_rejected() {
        assert!(TelegramBot::new("  ", "bot", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_send_invoice_payload_shape() {
        let prices = vec![LineItem {
            label: "Pikachu x2".into(),
            amount: 20,
        }];
        let body = serde_json::to_value(SendInvoice {
            chat_id: 42,
            title: "Pikachu Pokemon Card",
            description: "Purchase 2 units of Pikachu Pokemon card",
            payload: "cafe",
            provider_token: "",
            currency: STARS_CURRENCY,
            prices: &prices,
        })
        .unwrap();

        assert_eq!(body["currency"], "XTR");
        assert_eq!(body["provider_token"], "");
        assert_eq!(body["prices"], json!([{ "label": "Pikachu x2", "amount": 20 }]));
    }

    #[test]
    fn test_pre_checkout_omits_missing_error_message() {
        let body = serde_json::to_value(AnswerPreCheckoutQuery {
            pre_checkout_query_id: "q1",
            ok: true,
            error_message: None,
        })
        .unwrap();
        assert!(body.get("error_message").is_none());
    }

    #[test]
    fn test_api_error_envelope_becomes_error() {
        let failed: ApiResponse<bool> = serde_json::from_value(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found"
        }))
        .unwrap();
        let err = failed.into_result("sendMessage").unwrap_err();
        assert!(err.to_string().contains("chat not found"));

        let succeeded: ApiResponse<bool> =
            serde_json::from_value(json!({ "ok": true, "result": true })).unwrap();
        assert!(succeeded.into_result("setWebhook").unwrap());
    }
}
