//! # Petamini Binary
//!
//! The entry point that assembles the backend from the configured plugins.

mod config;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use pm_api::middleware::{cors_policy, standard_middleware};
use pm_api::{configure_routes, AppState};
use pm_core::{AccessTracker, Catalogue, FeedEngine, SettlementEngine, StoreSettings, UserService};
use pm_db_sqlite::SqliteStore;

use crate::config::Config;

#[cfg(feature = "bot-telegram")]
use pm_bot_telegram::TelegramBot;

#[cfg(feature = "bot-telegram")]
const BOT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env()?;
    log::info!("Starting Petamini backend ({})", config.environment);

    // 1. Initialize Database Implementation
    let store = Arc::new(
        SqliteStore::with_max_connections(&config.database_url, config.db_max_connections).await?,
    );
    let settings = StoreSettings {
        timeout: config.store_timeout,
    };

    // 2. Initialize the payment bot, if enabled
    let settlement = init_settlement(&config, &store, settings).await?;
    let payments_enabled = settlement.is_some();
    if !payments_enabled {
        log::warn!("Telegram bot disabled: payment routes and webhook are not mounted");
    }

    // 3. Wrap in AppState
    let state = web::Data::new(AppState {
        catalogue: Catalogue::new(store.clone(), settings),
        users: UserService::new(store.clone(), settings),
        feed: FeedEngine::new(store.clone(), store.clone(), settings),
        access: AccessTracker::new(store.clone(), store.clone(), settings),
        settlement,
        webhook_secret: config
            .telegram
            .as_ref()
            .and_then(|t| t.webhook_secret.clone()),
    });

    let frontend_url = config.frontend_url.clone();
    log::info!("Petamini listening on http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(cors_policy(&frontend_url))
            .wrap(standard_middleware())
            .app_data(state.clone())
            .configure(|cfg| configure_routes(cfg, payments_enabled))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}

#[cfg(feature = "bot-telegram")]
async fn init_settlement(
    config: &Config,
    store: &Arc<SqliteStore>,
    settings: StoreSettings,
) -> anyhow::Result<Option<SettlementEngine>> {
    let Some(telegram) = &config.telegram else {
        return Ok(None);
    };
    let mut bot = TelegramBot::new(&telegram.token, &telegram.bot_username, BOT_REQUEST_TIMEOUT)?;
    bot.resolve_username().await?;
    log::info!("Telegram bot @{} enabled", bot.bot_username());
    let bot = Arc::new(bot);

    if config.is_production() {
        match config.webhook_url() {
            Some(url) => {
                // A failed registration leaves the previous webhook in place.
                if let Err(e) = bot.set_webhook(&url, telegram.webhook_secret.as_deref()).await {
                    log::error!("Failed to register webhook {}: {:#}", url, e);
                }
            }
            None => log::warn!("No public URL configured; webhook not registered"),
        }
    }

    Ok(Some(SettlementEngine::new(
        store.clone(),
        store.clone(),
        bot,
        settings,
    )))
}

#[cfg(not(feature = "bot-telegram"))]
async fn init_settlement(
    config: &Config,
    _store: &Arc<SqliteStore>,
    _settings: StoreSettings,
) -> anyhow::Result<Option<SettlementEngine>> {
    if config.telegram.is_some() {
        log::warn!("Built without the bot-telegram feature; ignoring TELEGRAM_BOT_TOKEN");
    }
    Ok(None)
}
