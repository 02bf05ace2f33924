//! User profiles, collections and the spend leaderboard.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{LeaderboardEntry, OwnedItem, User, UserProfile, UserStats};
use crate::store::{bounded, StoreSettings};
use crate::traits::UserRepo;

pub const DEFAULT_LEADERBOARD_LIMIT: i64 = 10;
pub const MAX_LEADERBOARD_LIMIT: i64 = 100;

/// Falls back to the default for anything outside `1..=100`.
pub fn leaderboard_limit(requested: Option<i64>) -> i64 {
    match requested {
        Some(n) if (1..=MAX_LEADERBOARD_LIMIT).contains(&n) => n,
        _ => DEFAULT_LEADERBOARD_LIMIT,
    }
}

fn total_cards(user: &User) -> i64 {
    user.owned_items.iter().map(|c| c.units).sum()
}

pub struct UserService {
    users: Arc<dyn UserRepo>,
    settings: StoreSettings,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepo>, settings: StoreSettings) -> Self {
        Self { users, settings }
    }

    /// Inserts a brand-new user with zero aggregates, or refreshes the
    /// profile fields of an existing one. Aggregates are never touched here.
    pub async fn create_or_update_user(&self, profile: &UserProfile) -> Result<bool> {
        if profile.telegram_id <= 0 {
            return Err(AppError::InvalidInput("invalid user ID".into()));
        }
        let created = bounded(
            self.settings.timeout,
            "upsert user profile",
            self.users.upsert_profile(profile, Utc::now()),
        )
        .await?;
        if created {
            log::info!("New user created: {} (ID: {})", profile.username, profile.telegram_id);
        }
        Ok(created)
    }

    pub async fn get_user(&self, telegram_id: i64) -> Result<User> {
        bounded(self.settings.timeout, "load user", self.users.get_user(telegram_id))
            .await?
            .ok_or_else(|| AppError::not_found("User", telegram_id))
    }

    pub async fn user_stats(&self, telegram_id: i64) -> Result<UserStats> {
        let user = self.get_user(telegram_id).await?;
        let unique_items = user
            .owned_items
            .iter()
            .map(|c| c.item_name.as_str())
            .collect::<HashSet<_>>()
            .len();

        Ok(UserStats {
            telegram_id: user.telegram_id,
            username: user.username.clone(),
            total_cards: total_cards(&user),
            unique_items,
            total_purchases: user.total_purchases,
            total_spent: user.total_spent,
            member_since: user.created_at,
            last_purchase: user.updated_at,
        })
    }

    /// Owned cards; an unknown user simply has none.
    pub async fn user_collection(&self, telegram_id: i64) -> Result<Vec<OwnedItem>> {
        let user = bounded(self.settings.timeout, "load user", self.users.get_user(telegram_id)).await?;
        Ok(user.map(|u| u.owned_items).unwrap_or_default())
    }

    pub async fn top_collectors(&self, limit: i64) -> Result<Vec<User>> {
        bounded(
            self.settings.timeout,
            "list top collectors",
            self.users.top_by_spent(limit),
        )
        .await
    }

    pub async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let users = self.top_collectors(limit).await?;
        Ok(users
            .iter()
            .enumerate()
            .map(|(i, user)| LeaderboardEntry {
                rank: i + 1,
                telegram_id: user.telegram_id,
                username: user.username.clone(),
                total_cards: total_cards(user),
                total_purchases: user.total_purchases,
                total_spent: user.total_spent,
            })
            .collect())
    }
}
