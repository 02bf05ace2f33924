//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//! Repository ports report infrastructure failures through `anyhow`; the
//! engines attach operation context and map them onto `AppError`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AccessStats, ActivityCounter, DailyAccess, InvoiceRequest, Item, PageAccess, PaymentCapture,
    Post, PostKind, PurchaseRecord, User, UserProfile,
};

/// Result of applying a captured payment to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// All three records were updated and committed.
    Settled(PurchaseRecord),
    /// No pending purchase carries this token; nothing was written.
    NotPending,
    /// The decrement would have driven availability negative; nothing was written.
    Oversold {
        purchase: PurchaseRecord,
        available: Option<i64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreatePostOutcome {
    Created(Post),
    /// `link` is already carried by `existing`; nothing was written.
    Duplicate { link: String, existing: Post },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromoteOutcome {
    Promoted(Post),
    AlreadyPromoted(Post),
    NotFound,
}

/// Inventory store.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ItemRepo: Send + Sync {
    async fn list_items(&self) -> anyhow::Result<Vec<Item>>;
    async fn get_item(&self, id: Uuid) -> anyhow::Result<Option<Item>>;
}

/// Purchase ledger plus the settlement unit of work spanning items and users.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    async fn insert_pending(&self, purchase: &PurchaseRecord) -> anyhow::Result<()>;
    async fn find_by_token(&self, invoice_token: &str) -> anyhow::Result<Option<PurchaseRecord>>;
    /// Completed purchases of a user, newest first.
    async fn completed_for_user(&self, user_id: i64) -> anyhow::Result<Vec<PurchaseRecord>>;
    /// Claims the pending purchase, decrements inventory and credits the
    /// paying user as one all-or-nothing transaction.
    async fn settle(&self, capture: &PaymentCapture) -> anyhow::Result<SettlementOutcome>;
}

/// User ledger.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Inserts with zero aggregates if absent, else updates profile fields only.
    /// Returns `true` when the user was created.
    async fn upsert_profile(&self, profile: &UserProfile, now: DateTime<Utc>) -> anyhow::Result<bool>;
    async fn get_user(&self, telegram_id: i64) -> anyhow::Result<Option<User>>;
    /// Users ordered by total spend, highest first.
    async fn top_by_spent(&self, limit: i64) -> anyhow::Result<Vec<User>>;
    /// Upserts the user and increments one feed counter. An empty username
    /// leaves the stored one untouched.
    async fn bump_activity(
        &self,
        telegram_id: i64,
        username: &str,
        counter: ActivityCounter,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

/// Linkers post store.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Inserts the post unless one of its links is carried by another post.
    async fn create_post(&self, post: &Post) -> anyhow::Result<CreatePostOutcome>;
    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>>;
    /// All posts, newest first.
    async fn list_recent(&self) -> anyhow::Result<Vec<Post>>;
    async fn list_by_tag(&self, tag: &str) -> anyhow::Result<Vec<Post>>;
    async fn find_by_link(&self, link: &str) -> anyhow::Result<Option<Post>>;
    async fn update_content(
        &self,
        id: Uuid,
        content: &str,
        kind: PostKind,
        links: &[String],
        tags: &[String],
    ) -> anyhow::Result<Option<Post>>;
    /// Returns `false` when no post was deleted.
    async fn delete_post(&self, id: Uuid) -> anyhow::Result<bool>;
    /// Adds `user_id` to the promoter set and bumps the count, guarded by
    /// the user not already being present.
    async fn promote(&self, id: Uuid, user_id: i64) -> anyhow::Result<PromoteOutcome>;
}

/// Page-access log.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AccessRepo: Send + Sync {
    async fn exists_since(
        &self,
        user_id: i64,
        page_url: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<bool>;
    async fn insert_access(&self, access: &PageAccess) -> anyhow::Result<()>;
    async fn stats(&self, recent_since: DateTime<Utc>) -> anyhow::Result<AccessStats>;
    async fn history(&self, user_id: i64, limit: i64) -> anyhow::Result<Vec<PageAccess>>;
    /// Per-day counts since `since`, newest day first.
    async fn daily(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<DailyAccess>>;
}

/// Telegram bot contract used by the settlement engine.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BotGateway: Send + Sync {
    /// Presents a payable invoice to the user; returns the invoice link.
    async fn deliver_invoice(&self, request: &InvoiceRequest) -> anyhow::Result<String>;
    /// Best-effort message after settlement.
    async fn notify_payment_outcome(&self, chat_id: i64, succeeded: bool) -> anyhow::Result<()>;
    async fn answer_pre_checkout(
        &self,
        query_id: &str,
        ok: bool,
        error_message: Option<String>,
    ) -> anyhow::Result<()>;
}
