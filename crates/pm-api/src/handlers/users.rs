use actix_web::{web, HttpResponse};
use pm_core::users::leaderboard_limit;
use serde::Deserialize;
use serde_json::json;

use super::{lenient_number, State};
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

impl LimitQuery {
    fn leaderboard_limit(&self) -> i64 {
        leaderboard_limit(lenient_number(self.limit.as_deref()))
    }
}

pub async fn profile(data: State, path: web::Path<i64>) -> ApiResult<HttpResponse> {
    let user = data.users.get_user(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

pub async fn stats(data: State, path: web::Path<i64>) -> ApiResult<HttpResponse> {
    let stats = data.users.user_stats(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn collection(data: State, path: web::Path<i64>) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    let collection = data.users.user_collection(user_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "userId": user_id,
        "total": collection.len(),
        "collection": collection,
    })))
}

pub async fn leaderboard(data: State, query: web::Query<LimitQuery>) -> ApiResult<HttpResponse> {
    let leaderboard = data.users.leaderboard(query.leaderboard_limit()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "total": leaderboard.len(),
        "leaderboard": leaderboard,
    })))
}

pub async fn top_collectors(data: State, query: web::Query<LimitQuery>) -> ApiResult<HttpResponse> {
    let collectors = data.users.top_collectors(query.leaderboard_limit()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "total": collectors.len(),
        "collectors": collectors,
    })))
}
