//! # pm-api
//!
//! The web routing and orchestration layer for Petamini.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod webhook;

use actix_web::{error::InternalError, web, HttpResponse, ResponseError};

pub use error::ApiError;
pub use handlers::AppState;

/// Configures the routes of the Mini-App backend.
///
/// # Developer Note
/// Payment routes and the webhook exist only when the Telegram bot is
/// enabled. Static `/linkers/...` paths are registered before `/linkers/{id}`
/// so the parameterised resource cannot shadow them.
pub fn configure_routes(cfg: &mut web::ServiceConfig, payments_enabled: bool) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config())
        .route("/health", web::get().to(handlers::health));

    let mut api = web::scope("/api")
        // Pokemon cards
        .route("/pokemons", web::get().to(handlers::pokemons::list_pokemons))
        .route("/pokemons/{id}", web::get().to(handlers::pokemons::get_pokemon))
        // Users
        .route("/users/profile/{userId}", web::get().to(handlers::users::profile))
        .route("/users/stats/{userId}", web::get().to(handlers::users::stats))
        .route("/users/collection/{userId}", web::get().to(handlers::users::collection))
        .route("/users/leaderboard", web::get().to(handlers::users::leaderboard))
        .route("/users/top", web::get().to(handlers::users::top_collectors))
        // Linkers
        .route("/linkers", web::get().to(handlers::linkers::list_linkers))
        .route("/linkers", web::post().to(handlers::linkers::create_linker))
        .route("/linkers/check-duplicate", web::get().to(handlers::linkers::check_duplicate))
        .route("/linkers/tag/{tag}", web::get().to(handlers::linkers::by_tag))
        .route("/linkers/{id}", web::put().to(handlers::linkers::update_linker))
        .route("/linkers/{id}", web::delete().to(handlers::linkers::delete_linker))
        .route("/linkers/{id}/promote", web::post().to(handlers::linkers::promote_linker))
        // Access tracking
        .route("/access/track", web::post().to(handlers::access::track))
        .route("/access/stats", web::get().to(handlers::access::stats))
        .route("/access/daily", web::get().to(handlers::access::daily))
        .route("/access/history/{userId}", web::get().to(handlers::access::history));

    if payments_enabled {
        api = api
            .route("/payments/create-invoice", web::post().to(handlers::payments::create_invoice))
            .route("/payments/status", web::post().to(handlers::payments::payment_status))
            .route("/payments/user/{userId}", web::get().to(handlers::payments::user_purchases))
            .route("/webhook", web::post().to(webhook::handle_update));
    }

    cfg.service(api);
}

fn reject(message: String, err: actix_web::Error) -> actix_web::Error {
    let api_err = ApiError::invalid(message);
    let response: HttpResponse = api_err.error_response();
    InternalError::from_response(err, response).into()
}

/// Malformed bodies become the structured 400 body.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| {
            let message = format!("invalid request body: {err}");
            reject(message, err.into())
        })
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        let message = format!("invalid query string: {err}");
        reject(message, err.into())
    })
}

pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _req| {
        let message = format!("invalid path parameter: {err}");
        reject(message, err.into())
    })
}
