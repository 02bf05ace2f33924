//! Engine behaviour against a real SQLite store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use pm_core::feed::NewPost;
use pm_core::traits::{ItemRepo, MockBotGateway, PostRepo, PurchaseLedger, UserRepo};
use pm_core::{
    AppError, FeedEngine, Item, PaymentCapture, PurchaseStatus, SettlementEngine, StoreSettings,
    UserProfile, UserService,
};
use pm_db_sqlite::SqliteStore;
use uuid::Uuid;

struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("petamini-test-{}.db", Uuid::now_v7()));
        Self { path }
    }

    fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}

fn card(available: i64) -> Item {
    let now = Utc::now();
    Item {
        id: Uuid::now_v7(),
        pokemon_id: 25,
        name: "Pikachu".into(),
        image: "pikachu.png".into(),
        types: vec!["electric".into()],
        rarity: "rare".into(),
        price_per_unit: 10,
        total_units: available,
        available_units: available,
        created_at: now,
        updated_at: now,
    }
}

fn accepting_bot() -> Arc<MockBotGateway> {
    let mut bot = MockBotGateway::new();
    bot.expect_deliver_invoice()
        .returning(|req| Ok(format!("https://t.me/petamini_bot?start=invoice_{}", req.invoice_token)));
    bot.expect_notify_payment_outcome().returning(|_, _| Ok(()));
    Arc::new(bot)
}

fn settlement(store: &Arc<SqliteStore>) -> SettlementEngine {
    SettlementEngine::new(
        store.clone(),
        store.clone(),
        accepting_bot(),
        StoreSettings::default(),
    )
}

fn capture(token: &str, user_id: i64) -> PaymentCapture {
    PaymentCapture {
        invoice_token: token.to_string(),
        user_id,
        username: format!("trainer{user_id}"),
        external_charge_id: format!("charge-{token}"),
    }
}

#[tokio::test]
async fn test_concurrent_settlements_never_oversell() {
    let db = TempDb::new();
    let store = Arc::new(SqliteStore::with_max_connections(&db.url(), 4).await.unwrap());
    let item = card(3);
    store.insert_item(&item).await.unwrap();

    let engine = Arc::new(settlement(&store));
    let mut tokens = Vec::new();
    for _ in 0..6 {
        let invoice = engine.create_invoice(42, item.id, 1).await.unwrap();
        tokens.push(invoice.invoice_token);
    }

    let handles: Vec<_> = tokens
        .into_iter()
        .map(|token| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.settle_successful_payment(&capture(&token, 42)).await })
        })
        .collect();

    let mut settled = 0;
    let mut oversold = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => settled += 1,
            Err(AppError::InvariantViolation(_)) => oversold += 1,
            Err(e) => panic!("unexpected settlement error: {e}"),
        }
    }
    assert_eq!(settled, 3);
    assert_eq!(oversold, 3);

    let item = store.get_item(item.id).await.unwrap().unwrap();
    assert_eq!(item.available_units, 0);

    let user = store.get_user(42).await.unwrap().unwrap();
    assert_eq!(user.total_purchases, 3);
    assert_eq!(user.total_spent, 30);
    assert_eq!(store.completed_for_user(42).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_duplicate_capture_settles_once() {
    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    let item = card(10);
    store.insert_item(&item).await.unwrap();
    let engine = settlement(&store);

    let invoice = engine.create_invoice(7, item.id, 2).await.unwrap();
    assert_eq!(invoice.total_price, 20);

    let purchase = engine
        .settle_successful_payment(&capture(&invoice.invoice_token, 7))
        .await
        .unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Completed);

    let replay = engine
        .settle_successful_payment(&capture(&invoice.invoice_token, 7))
        .await;
    assert!(matches!(replay, Err(AppError::AlreadyProcessed(_))));

    assert_eq!(store.get_item(item.id).await.unwrap().unwrap().available_units, 8);
    let user = store.get_user(7).await.unwrap().unwrap();
    assert_eq!(user.total_purchases, 1);
    assert_eq!(user.owned_items.len(), 1);
    assert_eq!(user.owned_items[0].units, 2);

    let status = engine.get_payment_status(&invoice.invoice_token).await.unwrap();
    assert_eq!(status.status, PurchaseStatus::Completed);
    assert!(status.completed_at.is_some());
}

#[tokio::test]
async fn test_concurrent_capture_of_one_token_settles_once() {
    let db = TempDb::new();
    let store = Arc::new(SqliteStore::with_max_connections(&db.url(), 5).await.unwrap());
    let item = card(10);
    store.insert_item(&item).await.unwrap();

    let engine = Arc::new(settlement(&store));
    let invoice = engine.create_invoice(3, item.id, 2).await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = engine.clone();
            let token = invoice.invoice_token.clone();
            tokio::spawn(async move { engine.settle_successful_payment(&capture(&token, 3)).await })
        })
        .collect();

    let mut settled = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => settled += 1,
            Err(AppError::AlreadyProcessed(_)) => duplicates += 1,
            Err(e) => panic!("unexpected settlement error: {e}"),
        }
    }
    assert_eq!(settled, 1);
    assert_eq!(duplicates, 15);

    assert_eq!(store.get_item(item.id).await.unwrap().unwrap().available_units, 8);
    let user = store.get_user(3).await.unwrap().unwrap();
    assert_eq!(user.total_purchases, 1);
    assert_eq!(user.total_spent, 20);
    assert_eq!(user.owned_items.len(), 1);
    assert_eq!(store.completed_for_user(3).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_full_invoice_is_reported_as_oversold() {
    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    let item = card(5);
    store.insert_item(&item).await.unwrap();
    let engine = settlement(&store);

    // Both pass the advisory check because neither has settled yet.
    let first = engine.create_invoice(1, item.id, 5).await.unwrap();
    let second = engine.create_invoice(2, item.id, 5).await.unwrap();

    engine
        .settle_successful_payment(&capture(&first.invoice_token, 1))
        .await
        .unwrap();
    let result = engine
        .settle_successful_payment(&capture(&second.invoice_token, 2))
        .await;
    assert!(matches!(result, Err(AppError::InvariantViolation(_))));

    assert_eq!(store.get_item(item.id).await.unwrap().unwrap().available_units, 0);
    let pending = store.find_by_token(&second.invoice_token).await.unwrap().unwrap();
    assert_eq!(pending.status, PurchaseStatus::Pending);
    assert!(store.get_user(2).await.unwrap().is_none());

    let third = engine.create_invoice(3, item.id, 1).await;
    assert!(matches!(
        third,
        Err(AppError::InsufficientInventory { requested: 1, available: 0 })
    ));
}

#[tokio::test]
async fn test_profile_refresh_leaves_aggregates_untouched() {
    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    let item = card(4);
    store.insert_item(&item).await.unwrap();
    let engine = settlement(&store);
    let users = UserService::new(store.clone(), StoreSettings::default());

    let invoice = engine.create_invoice(9, item.id, 1).await.unwrap();
    engine
        .settle_successful_payment(&capture(&invoice.invoice_token, 9))
        .await
        .unwrap();

    let profile = UserProfile {
        telegram_id: 9,
        username: "renamed".into(),
        first_name: "Gary".into(),
        last_name: "Oak".into(),
    };
    assert!(!users.create_or_update_user(&profile).await.unwrap());
    assert!(!users.create_or_update_user(&profile).await.unwrap());

    let user = users.get_user(9).await.unwrap();
    assert_eq!(user.username, "renamed");
    assert_eq!(user.total_purchases, 1);
    assert_eq!(user.total_spent, 10);
    assert_eq!(user.owned_items.len(), 1);

    let board = users.leaderboard(10).await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].rank, 1);
    assert_eq!(board[0].total_cards, 1);
}

#[tokio::test]
async fn test_concurrent_promotions_by_one_user_count_once() {
    let db = TempDb::new();
    let store = Arc::new(SqliteStore::with_max_connections(&db.url(), 4).await.unwrap());
    let feed = Arc::new(FeedEngine::new(store.clone(), store.clone(), StoreSettings::default()));

    let post = feed
        .create_post(NewPost {
            user_id: 5,
            username: "brock".into(),
            content: "Rock types https://pokeapi.co/api/v2/type/6".into(),
            tags: vec!["types".into()],
        })
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let feed = feed.clone();
            tokio::spawn(async move { feed.promote_post(post.id, 77).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let handles: Vec<_> = (100..105)
        .map(|user| {
            let feed = feed.clone();
            tokio::spawn(async move { feed.promote_post(post.id, user).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = store.get_post(post.id).await.unwrap().unwrap();
    assert_eq!(stored.promotions, 6);
    assert_eq!(stored.promoted_by.len() as i64, stored.promotions);

    let promoter = store.get_user(77).await.unwrap().unwrap();
    assert_eq!(promoter.promotions_made, 1);
}

#[tokio::test]
async fn test_duplicate_link_conflicts_and_new_link_succeeds() {
    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    let feed = FeedEngine::new(store.clone(), store.clone(), StoreSettings::default());

    let original = feed
        .create_post(NewPost {
            user_id: 1,
            username: "misty".into(),
            content: "https://bulbapedia.bulbagarden.net".into(),
            tags: vec![],
        })
        .await
        .unwrap();

    let duplicate = feed
        .create_post(NewPost {
            user_id: 2,
            username: "tracey".into(),
            content: "seen this? https://bulbapedia.bulbagarden.net".into(),
            tags: vec![],
        })
        .await;
    match duplicate {
        Err(AppError::DuplicateLink { link, existing }) => {
            assert_eq!(link, "https://bulbapedia.bulbagarden.net");
            assert_eq!(existing.id, original.id);
        }
        other => panic!("expected duplicate link, got {other:?}"),
    }

    let fresh = feed
        .create_post(NewPost {
            user_id: 2,
            username: "tracey".into(),
            content: "https://serebii.net".into(),
            tags: vec![],
        })
        .await
        .unwrap();
    assert_eq!(fresh.links, vec!["https://serebii.net".to_string()]);

    assert_eq!(store.get_user(2).await.unwrap().unwrap().posts_count, 1);
    assert_eq!(
        feed.check_duplicate("https://serebii.net")
            .await
            .unwrap()
            .map(|p| p.id),
        Some(fresh.id)
    );
}

#[tokio::test]
async fn test_concurrent_creates_with_same_link_keep_one() {
    let db = TempDb::new();
    let store = Arc::new(SqliteStore::with_max_connections(&db.url(), 4).await.unwrap());
    let feed = Arc::new(FeedEngine::new(store.clone(), store.clone(), StoreSettings::default()));

    let handles: Vec<_> = (1..=6)
        .map(|user| {
            let feed = feed.clone();
            tokio::spawn(async move {
                feed.create_post(NewPost {
                    user_id: user,
                    username: String::new(),
                    content: "https://pokemondb.net/pokedex".into(),
                    tags: vec![],
                })
                .await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(AppError::DuplicateLink { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(store.list_recent().await.unwrap().len(), 1);
}
