//! Page-access tracking for the Mini-App.
//!
//! Visits are deduplicated per user and page over a short window. The
//! profile "last seen" refresh that follows a recorded visit is best-effort.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{AccessStats, DailyAccess, PageAccess, UserProfile};
use crate::store::{bounded, StoreSettings};
use crate::traits::{AccessRepo, UserRepo};

/// Repeat visits inside this window are not recorded again.
pub const DEDUP_WINDOW_MINUTES: i64 = 5;
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 100;
pub const DEFAULT_DAILY_DAYS: i64 = 30;
pub const MAX_DAILY_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackAccess {
    pub profile: UserProfile,
    pub page_url: String,
    pub user_agent: String,
    pub ip_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Recorded,
    /// Same user and page seen within the dedup window.
    Deduplicated,
    /// The visit was stored but the profile refresh failed.
    RecordedProfileStale,
}

impl TrackOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            TrackOutcome::Recorded => "User access tracked successfully",
            TrackOutcome::Deduplicated => "Access already tracked recently",
            TrackOutcome::RecordedProfileStale => "Access tracked, but user profile update failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub daily_stats: Vec<DailyAccess>,
    pub period: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Falls back to the default for anything outside `1..=100`.
pub fn history_limit(requested: Option<i64>) -> i64 {
    match requested {
        Some(n) if (1..=MAX_HISTORY_LIMIT).contains(&n) => n,
        _ => DEFAULT_HISTORY_LIMIT,
    }
}

pub struct AccessTracker {
    access: Arc<dyn AccessRepo>,
    users: Arc<dyn UserRepo>,
    settings: StoreSettings,
}

impl AccessTracker {
    pub fn new(access: Arc<dyn AccessRepo>, users: Arc<dyn UserRepo>, settings: StoreSettings) -> Self {
        Self {
            access,
            users,
            settings,
        }
    }

    pub async fn track(&self, visit: TrackAccess) -> Result<TrackOutcome> {
        if visit.profile.telegram_id <= 0 {
            return Err(AppError::InvalidInput("invalid user ID".into()));
        }
        if visit.page_url.trim().is_empty() {
            return Err(AppError::InvalidInput("page URL is required".into()));
        }

        let now = Utc::now();
        let since = now - Duration::minutes(DEDUP_WINDOW_MINUTES);
        let seen = bounded(
            self.settings.timeout,
            "check recent access",
            self.access
                .exists_since(visit.profile.telegram_id, &visit.page_url, since),
        )
        .await?;
        if seen {
            return Ok(TrackOutcome::Deduplicated);
        }

        let record = PageAccess {
            id: Uuid::now_v7(),
            user_id: visit.profile.telegram_id,
            username: visit.profile.username.clone(),
            first_name: visit.profile.first_name.clone(),
            last_name: visit.profile.last_name.clone(),
            page_url: visit.page_url,
            user_agent: visit.user_agent,
            ip_address: visit.ip_address,
            created_at: now,
        };
        bounded(
            self.settings.timeout,
            "insert page access",
            self.access.insert_access(&record),
        )
        .await?;

        let refreshed = bounded(
            self.settings.timeout,
            "refresh user profile",
            self.users.upsert_profile(&visit.profile, now),
        )
        .await;
        match refreshed {
            Ok(_) => Ok(TrackOutcome::Recorded),
            Err(e) => {
                log::warn!(
                    "Access recorded but profile refresh failed for user {}: {}",
                    record.user_id,
                    e
                );
                Ok(TrackOutcome::RecordedProfileStale)
            }
        }
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> Result<AccessStats> {
        bounded(
            self.settings.timeout,
            "aggregate access stats",
            self.access.stats(now - Duration::hours(24)),
        )
        .await
    }

    pub async fn history(&self, user_id: i64, limit: i64) -> Result<Vec<PageAccess>> {
        bounded(
            self.settings.timeout,
            "load access history",
            self.access.history(user_id, limit),
        )
        .await
    }

    /// Per-day activity for the last `days` days, starting at UTC midnight.
    pub async fn daily(&self, days: i64, now: DateTime<Utc>) -> Result<DailyReport> {
        if !(1..=MAX_DAILY_DAYS).contains(&days) {
            return Err(AppError::InvalidInput(format!(
                "days parameter must be between 1 and {MAX_DAILY_DAYS}"
            )));
        }
        let start_date = (now - Duration::days(days)).date_naive();
        let since = start_date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| AppError::Internal("invalid start date".into()))?;

        let daily_stats = bounded(
            self.settings.timeout,
            "aggregate daily access",
            self.access.daily(since),
        )
        .await?;

        Ok(DailyReport {
            daily_stats,
            period: days,
            start_date,
            end_date: now.date_naive(),
        })
    }
}
