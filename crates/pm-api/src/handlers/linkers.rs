//! Linkers feed endpoints.

use actix_web::{web, HttpResponse};
use pm_core::feed::{FeedSort, NewPost};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{require_user_id, State};
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DuplicateQuery {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdQuery {
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkerRequest {
    pub user_id: i64,
    #[serde(default)]
    pub username: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLinkerRequest {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub async fn list_linkers(data: State, query: web::Query<ListQuery>) -> ApiResult<HttpResponse> {
    let sort = match query.sort.as_deref() {
        None | Some("") => FeedSort::default(),
        Some(raw) => raw.parse()?,
    };
    let posts = data.feed.list_posts(sort).await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn check_duplicate(
    data: State,
    query: web::Query<DuplicateQuery>,
) -> ApiResult<HttpResponse> {
    let url = query.url.as_deref().unwrap_or_default();
    let body = match data.feed.check_duplicate(url).await? {
        Some(existing) => json!({
            "exists": true,
            "linker": existing,
            "message": "This link has already been posted",
        }),
        None => json!({ "exists": false }),
    };
    Ok(HttpResponse::Ok().json(body))
}

pub async fn by_tag(data: State, path: web::Path<String>) -> ApiResult<HttpResponse> {
    let posts = data.feed.posts_by_tag(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn create_linker(
    data: State,
    body: web::Json<CreateLinkerRequest>,
) -> ApiResult<HttpResponse> {
    let req = body.into_inner();
    let post = data
        .feed
        .create_post(NewPost {
            user_id: req.user_id,
            username: req.username,
            content: req.content,
            tags: req.tags,
        })
        .await?;
    Ok(HttpResponse::Created().json(post))
}

pub async fn update_linker(
    data: State,
    path: web::Path<Uuid>,
    query: web::Query<UserIdQuery>,
    body: web::Json<UpdateLinkerRequest>,
) -> ApiResult<HttpResponse> {
    let user_id = require_user_id(query.user_id)?;
    let req = body.into_inner();
    let post = data
        .feed
        .update_post(path.into_inner(), user_id, &req.content, req.tags)
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn promote_linker(
    data: State,
    path: web::Path<Uuid>,
    query: web::Query<UserIdQuery>,
) -> ApiResult<HttpResponse> {
    let user_id = require_user_id(query.user_id)?;
    let post = data.feed.promote_post(path.into_inner(), user_id).await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn delete_linker(
    data: State,
    path: web::Path<Uuid>,
    query: web::Query<UserIdQuery>,
) -> ApiResult<HttpResponse> {
    let user_id = require_user_id(query.user_id)?;
    data.feed.delete_post(path.into_inner(), user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Linker deleted successfully" })))
}
