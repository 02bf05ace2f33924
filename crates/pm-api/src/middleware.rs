//! petamini/crates/pm-api/src/middleware.rs Middleware
//!
//! Access logging and CORS for the Mini-App frontend.

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::Logger;

/// Dev-server origins that are always accepted next to the configured one.
const LOCAL_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://127.0.0.1:5173"];

// remote-ip "request-line" status-code response-size "referrer" "user-agent"
pub fn standard_middleware() -> Logger {
    Logger::default()
}

// Only the configured frontend (possibly a comma-separated list) and the
// local dev server may call the API from a browser.
pub fn cors_policy(frontend_url: &str) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CACHE_CONTROL,
        ])
        .supports_credentials()
        .max_age(3600);

    for origin in frontend_origins(frontend_url).into_iter().chain(LOCAL_ORIGINS) {
        cors = cors.allowed_origin(origin);
    }
    cors
}

fn frontend_origins(frontend_url: &str) -> Vec<&str> {
    frontend_url
        .split(',')
        .map(|s| s.trim().trim_end_matches('/'))
        .filter(|s| !s.is_empty() && !LOCAL_ORIGINS.contains(s))
        .collect()
}
