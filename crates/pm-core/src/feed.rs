//! # Feed Engine (Linkers)
//!
//! Posting with duplicate-link detection, one-time promotion and the
//! "popular" ranking.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{ActivityCounter, Post, PostKind};
use crate::store::{bounded, StoreSettings};
use crate::traits::{CreatePostOutcome, PostRepo, PromoteOutcome, UserRepo};

/// Maximum post length, in characters, after trimming.
pub const MAX_CONTENT_CHARS: usize = 250;

/// Posts younger than this get a decaying recency boost.
const RECENCY_WINDOW_HOURS: f64 = 48.0;
const RECENCY_WEIGHT: f64 = 0.05;
const QUALITY_WEIGHT: f64 = 0.25;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"{}|\\^\[\]`]+"#).expect("static URL pattern"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSort {
    #[default]
    Recent,
    Popular,
}

impl FromStr for FeedSort {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "recent" => Ok(FeedSort::Recent),
            "popular" => Ok(FeedSort::Popular),
            other => Err(AppError::InvalidInput(format!("unknown sort '{other}'"))),
        }
    }
}

/// Input for a new post.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// All `http(s)://` URLs in `text`, deduplicated, in order of first appearance.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in URL_PATTERN.find_iter(text) {
        if !urls.iter().any(|u| u == m.as_str()) {
            urls.push(m.as_str().to_string());
        }
    }
    urls
}

/// Content must be non-empty after trimming and at most 250 characters.
pub fn validate_content(content: &str) -> Result<()> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(
            "content is required; tags alone cannot be posted".into(),
        ));
    }
    if trimmed.chars().count() > MAX_CONTENT_CHARS {
        return Err(AppError::InvalidInput(format!(
            "content must be {MAX_CONTENT_CHARS} characters or less"
        )));
    }
    Ok(())
}

/// `p + 0.25*sqrt(p) + max(0, 48 - age_hours) * 0.05`
pub fn popularity_score(post: &Post, now: DateTime<Utc>) -> f64 {
    let age_ms = (now - post.created_at).num_milliseconds().max(0);
    let age_hours = age_ms as f64 / 3_600_000.0;
    let promotions = post.promotions.max(0) as f64;
    let recency_boost = (RECENCY_WINDOW_HOURS - age_hours).max(0.0) * RECENCY_WEIGHT;
    promotions + QUALITY_WEIGHT * promotions.sqrt() + recency_boost
}

/// Orders posts by descending score. Ties keep their input order.
pub fn rank_popular(posts: Vec<Post>, now: DateTime<Utc>) -> Vec<Post> {
    let mut scored: Vec<(f64, Post)> = posts
        .into_iter()
        .map(|p| (popularity_score(&p, now), p))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, p)| p).collect()
}

pub struct FeedEngine {
    posts: Arc<dyn PostRepo>,
    users: Arc<dyn UserRepo>,
    settings: StoreSettings,
}

impl FeedEngine {
    pub fn new(posts: Arc<dyn PostRepo>, users: Arc<dyn UserRepo>, settings: StoreSettings) -> Self {
        Self {
            posts,
            users,
            settings,
        }
    }

    /// Publishes a post unless one of its links was already posted.
    pub async fn create_post(&self, new_post: NewPost) -> Result<Post> {
        if new_post.user_id <= 0 {
            return Err(AppError::InvalidInput("invalid user ID".into()));
        }
        validate_content(&new_post.content)?;

        let links = extract_urls(&new_post.content);
        let post = Post {
            id: Uuid::now_v7(),
            user_id: new_post.user_id,
            username: new_post.username,
            kind: PostKind::for_links(&links),
            content: new_post.content,
            links,
            tags: new_post.tags,
            promotions: 0,
            promoted_by: Vec::new(),
            created_at: Utc::now(),
        };

        let outcome = bounded(self.settings.timeout, "create post", self.posts.create_post(&post)).await?;
        let post = match outcome {
            CreatePostOutcome::Created(post) => post,
            CreatePostOutcome::Duplicate { link, existing } => {
                return Err(AppError::DuplicateLink {
                    link,
                    existing: Box::new(existing),
                })
            }
        };

        self.record_activity(post.user_id, &post.username, ActivityCounter::Posts)
            .await;
        Ok(post)
    }

    /// One-time, non-toggleable promotion. Promoting twice returns the post
    /// unchanged.
    pub async fn promote_post(&self, post_id: Uuid, user_id: i64) -> Result<Post> {
        if user_id <= 0 {
            return Err(AppError::InvalidInput("invalid user ID".into()));
        }

        let outcome = bounded(
            self.settings.timeout,
            "promote post",
            self.posts.promote(post_id, user_id),
        )
        .await?;

        match outcome {
            PromoteOutcome::Promoted(post) => {
                self.record_activity(user_id, "", ActivityCounter::Promotions)
                    .await;
                Ok(post)
            }
            PromoteOutcome::AlreadyPromoted(post) => Ok(post),
            PromoteOutcome::NotFound => Err(AppError::not_found("Linker", post_id)),
        }
    }

    pub async fn list_posts(&self, sort: FeedSort) -> Result<Vec<Post>> {
        let posts = bounded(self.settings.timeout, "list posts", self.posts.list_recent()).await?;
        Ok(match sort {
            FeedSort::Recent => posts,
            FeedSort::Popular => rank_popular(posts, Utc::now()),
        })
    }

    pub async fn posts_by_tag(&self, tag: &str) -> Result<Vec<Post>> {
        if tag.trim().is_empty() {
            return Err(AppError::InvalidInput("tag is required".into()));
        }
        bounded(self.settings.timeout, "list posts by tag", self.posts.list_by_tag(tag)).await
    }

    /// The post already carrying `url`, if any.
    pub async fn check_duplicate(&self, url: &str) -> Result<Option<Post>> {
        if url.trim().is_empty() {
            return Err(AppError::InvalidInput("URL parameter is required".into()));
        }
        bounded(self.settings.timeout, "find post by link", self.posts.find_by_link(url)).await
    }

    /// Author-only edit of content and tags. Links are re-extracted but not
    /// checked against other posts.
    pub async fn update_post(
        &self,
        post_id: Uuid,
        user_id: i64,
        content: &str,
        tags: Vec<String>,
    ) -> Result<Post> {
        validate_content(content)?;
        self.owned_post(post_id, user_id, "edit").await?;

        let links = extract_urls(content);
        let kind = PostKind::for_links(&links);
        bounded(
            self.settings.timeout,
            "update post",
            self.posts.update_content(post_id, content, kind, &links, &tags),
        )
        .await?
        .ok_or_else(|| AppError::not_found("Linker", post_id))
    }

    pub async fn delete_post(&self, post_id: Uuid, user_id: i64) -> Result<()> {
        self.owned_post(post_id, user_id, "delete").await?;

        let deleted = bounded(self.settings.timeout, "delete post", self.posts.delete_post(post_id)).await?;
        if !deleted {
            return Err(AppError::not_found("Linker", post_id));
        }
        log::info!("Linker {} deleted by user {}", post_id, user_id);
        Ok(())
    }

    async fn owned_post(&self, post_id: Uuid, user_id: i64, action: &str) -> Result<Post> {
        let post = bounded(self.settings.timeout, "load post", self.posts.get_post(post_id))
            .await?
            .ok_or_else(|| AppError::not_found("Linker", post_id))?;
        if post.user_id != user_id {
            return Err(AppError::Forbidden(format!("you can only {action} your own posts")));
        }
        Ok(post)
    }

    // Aggregates are secondary; the primary write already succeeded.
    async fn record_activity(&self, user_id: i64, username: &str, counter: ActivityCounter) {
        let result = bounded(
            self.settings.timeout,
            "record user activity",
            self.users.bump_activity(user_id, username, counter, Utc::now()),
        )
        .await;
        if let Err(e) = result {
            log::warn!("Failed to update {:?} counter for user {}: {}", counter, user_id, e);
        }
    }
}
