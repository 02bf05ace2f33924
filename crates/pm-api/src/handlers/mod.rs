//! # pm-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the pm-core
//! engines. Handlers validate the request shape, call one engine operation
//! and serialize its result; every failure travels as an [`ApiError`].

pub mod access;
pub mod linkers;
pub mod payments;
pub mod pokemons;
pub mod users;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use pm_core::{AccessTracker, AppError, Catalogue, FeedEngine, SettlementEngine, UserService};
use serde_json::json;

use crate::error::{ApiError, ApiResult};

/// State shared across all Actix-web workers.
pub struct AppState {
    pub catalogue: Catalogue,
    pub users: UserService,
    pub feed: FeedEngine,
    pub access: AccessTracker,
    /// `None` when the Telegram bot is disabled.
    pub settlement: Option<SettlementEngine>,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` on webhook calls.
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub(crate) fn settlement(&self) -> ApiResult<&SettlementEngine> {
        self.settlement
            .as_ref()
            .ok_or_else(|| ApiError(AppError::Gateway("payments are disabled".into())))
    }
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}

/// Numeric query values the frontend may send malformed; those fall back
/// to the endpoint default instead of failing the request.
pub(crate) fn lenient_number(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse().ok())
}

pub(crate) fn require_user_id(user_id: Option<i64>) -> ApiResult<i64> {
    match user_id {
        None => Err(ApiError::invalid("User ID is required")),
        Some(id) if id <= 0 => Err(ApiError::invalid("invalid user ID")),
        Some(id) => Ok(id),
    }
}

pub(crate) type State = web::Data<AppState>;
