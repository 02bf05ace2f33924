//! petamini/crates/pm-core/src/lib.rs
//!
//! The central domain logic and interface definitions for the Petamini
//! backend: card settlement, the Linkers feed, users and access tracking.

pub mod access;
pub mod catalogue;
pub mod error;
pub mod feed;
pub mod models;
pub mod settlement;
pub mod store;
pub mod traits;
pub mod users;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;

pub use access::AccessTracker;
pub use catalogue::Catalogue;
pub use feed::FeedEngine;
pub use settlement::SettlementEngine;
pub use store::StoreSettings;
pub use users::UserService;

#[cfg(test)]
mod tests {
    use super::models::*;

    #[test]
    fn test_purchase_status_round_trips_through_text() {
        for status in [
            PurchaseStatus::Pending,
            PurchaseStatus::Completed,
            PurchaseStatus::Failed,
            PurchaseStatus::Refunded,
        ] {
            assert_eq!(status.as_str().parse::<PurchaseStatus>(), Ok(status));
        }
        assert!("settled".parse::<PurchaseStatus>().is_err());
    }

    #[test]
    fn test_post_serializes_kind_as_type() {
        let post = Post {
            id: uuid::Uuid::now_v7(),
            user_id: 9,
            username: "oak".into(),
            content: "https://pokeapi.co".into(),
            kind: PostKind::Url,
            links: vec!["https://pokeapi.co".into()],
            tags: vec![],
            promotions: 0,
            promoted_by: vec![],
            created_at: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["type"], "url");
        assert_eq!(json["userId"], 9);
        assert!(json["promotedBy"].as_array().unwrap().is_empty());
    }
}
