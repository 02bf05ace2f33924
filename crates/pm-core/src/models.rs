//! # Domain Models
//!
//! These structs represent the core entities of the Petamini backend:
//! the card marketplace (items, purchases, users) and the Linkers feed.
//! Entities use UUID v7 for time-ordered identification; users are keyed
//! by their Telegram id.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A purchasable Pokemon card with a finite unit count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Uuid,
    /// Pokedex number, used by the frontend for artwork lookup
    pub pokemon_id: i64,
    pub name: String,
    pub image: String,
    pub types: Vec<String>,
    /// common, rare, legendary
    pub rarity: String,
    /// Price of a single unit in Telegram Stars
    pub price_per_unit: i64,
    pub total_units: i64,
    /// Never negative; only decremented by settlement
    pub available_units: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Failed => "failed",
            PurchaseStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PurchaseStatus::Pending),
            "completed" => Ok(PurchaseStatus::Completed),
            "failed" => Ok(PurchaseStatus::Failed),
            "refunded" => Ok(PurchaseStatus::Refunded),
            other => Err(format!("unknown purchase status '{other}'")),
        }
    }
}

/// One invoice issued to a user and its settlement state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub id: Uuid,
    /// Telegram id of the buyer
    pub user_id: i64,
    pub username: String,
    pub item_id: Uuid,
    pub item_name: String,
    pub units: i64,
    pub total_price: i64,
    pub status: PurchaseStatus,
    /// Telegram payment charge id, set on completion
    pub external_charge_id: Option<String>,
    /// Opaque correlation token carried by the invoice payload (unique)
    pub invoice_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A card entry in a user's collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedItem {
    pub item_id: Uuid,
    pub item_name: String,
    pub units: i64,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub telegram_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub owned_items: Vec<OwnedItem>,
    pub total_purchases: i64,
    pub total_spent: i64,
    pub posts_count: i64,
    pub promotions_made: i64,
    pub role: String,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_active: Option<DateTime<Utc>>,
}

/// Profile fields supplied by the Telegram client on every interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub telegram_id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Which per-user feed counter an activity bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityCounter {
    Posts,
    Promotions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub telegram_id: i64,
    pub username: String,
    pub total_cards: i64,
    pub unique_items: usize,
    pub total_purchases: i64,
    pub total_spent: i64,
    pub member_since: DateTime<Utc>,
    pub last_purchase: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub telegram_id: i64,
    pub username: String,
    pub total_cards: i64,
    pub total_purchases: i64,
    pub total_spent: i64,
}

/// A single priced line on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub label: String,
    pub amount: i64,
}

/// Everything the bot needs to present a payable invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRequest {
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub invoice_token: String,
    pub line_items: Vec<LineItem>,
}

/// Returned to the client after an invoice was issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub invoice_link: String,
    #[serde(rename = "invoicePayload")]
    pub invoice_token: String,
    #[serde(rename = "totalStars")]
    pub total_price: i64,
}

/// A payment the provider reports as captured.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentCapture {
    pub invoice_token: String,
    pub user_id: i64,
    pub username: String,
    pub external_charge_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatus {
    pub status: PurchaseStatus,
    pub purchase_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// `url` when at least one link was extracted from the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Url,
    Text,
}

impl PostKind {
    pub fn for_links(links: &[String]) -> Self {
        if links.is_empty() {
            PostKind::Text
        } else {
            PostKind::Url
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Url => "url",
            PostKind::Text => "text",
        }
    }
}

impl FromStr for PostKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url" => Ok(PostKind::Url),
            "text" => Ok(PostKind::Text),
            other => Err(format!("unknown post kind '{other}'")),
        }
    }
}

/// A Linkers feed post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    /// Telegram id of the author
    pub user_id: i64,
    pub username: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: PostKind,
    /// URLs extracted from the content, deduplicated, in order of appearance
    pub links: Vec<String>,
    pub tags: Vec<String>,
    pub promotions: i64,
    /// Telegram ids that promoted this post; each at most once
    pub promoted_by: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

/// One recorded visit of a Mini-App page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAccess {
    pub id: Uuid,
    pub user_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub page_url: String,
    pub user_agent: String,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessStats {
    pub total_accesses: i64,
    pub unique_users: i64,
    #[serde(rename = "last24Hours")]
    pub last_24_hours: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAccess {
    /// UTC calendar day, `YYYY-MM-DD`
    pub date: String,
    pub count: i64,
    pub unique_users: i64,
}
