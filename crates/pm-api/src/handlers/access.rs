//! Page-access tracking endpoints.

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use pm_core::access::{history_limit, TrackAccess, DEFAULT_DAILY_DAYS};
use pm_core::{AccessStats, UserProfile};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{lenient_number, State};
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackAccessRequest {
    pub user_id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub page_url: String,
}

#[derive(Debug, Deserialize)]
pub struct DailyQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: AccessStats,
    timestamp: DateTime<Utc>,
}

pub async fn track(
    data: State,
    req: HttpRequest,
    body: web::Json<TrackAccessRequest>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let ip_address = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or_default()
        .to_string();

    let outcome = data
        .access
        .track(TrackAccess {
            profile: UserProfile {
                telegram_id: body.user_id,
                username: body.username,
                first_name: body.first_name,
                last_name: body.last_name,
            },
            page_url: body.page_url,
            user_agent,
            ip_address,
        })
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": outcome.message(),
    })))
}

pub async fn stats(data: State) -> ApiResult<HttpResponse> {
    let now = Utc::now();
    let stats = data.access.stats(now).await?;
    Ok(HttpResponse::Ok().json(StatsResponse {
        stats,
        timestamp: now,
    }))
}

pub async fn daily(data: State, query: web::Query<DailyQuery>) -> ApiResult<HttpResponse> {
    let days = query.days.unwrap_or(DEFAULT_DAILY_DAYS);
    let report = data.access.daily(days, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn history(
    data: State,
    path: web::Path<i64>,
    query: web::Query<HistoryQuery>,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    let limit = history_limit(lenient_number(query.limit.as_deref()));
    let accesses = data.access.history(user_id, limit).await?;
    Ok(HttpResponse::Ok().json(json!({
        "userId": user_id,
        "count": accesses.len(),
        "limit": limit,
        "accesses": accesses,
    })))
}
