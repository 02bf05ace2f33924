//! Process configuration read from the environment (and `.env`).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub environment: String,
    pub frontend_url: String,
    pub store_timeout: Duration,
    /// `None` when the bot is disabled.
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    /// Empty means the username is looked up with `getMe` at startup.
    pub bot_username: String,
    /// Public base the webhook path is appended to.
    pub webhook_base_url: Option<String>,
    pub webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let frontend_url = get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:5173".to_string());
        let bot_disabled = get("DISABLE_TELEGRAM_BOT")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let telegram = if bot_disabled {
            None
        } else {
            let token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
                anyhow!("TELEGRAM_BOT_TOKEN is required (set DISABLE_TELEGRAM_BOT=true to run without payments)")
            })?;
            let webhook_base_url = get("WEBHOOK_BASE_URL")
                .or_else(|| get("BACKEND_URL"))
                .or_else(|| Some(frontend_url.clone()))
                .and_then(|raw| last_entry(&raw));
            Some(TelegramConfig {
                token,
                bot_username: get("TELEGRAM_BOT_USERNAME").unwrap_or_default(),
                webhook_base_url,
                webhook_secret: get("WEBHOOK_SECRET"),
            })
        };

        let store_timeout_secs: u64 = parse_or(get("STORE_TIMEOUT_SECS"), "STORE_TIMEOUT_SECS", 5)?;
        if store_timeout_secs == 0 {
            bail!("STORE_TIMEOUT_SECS must be at least 1");
        }

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(get("PORT"), "PORT", 8080)?,
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite:petamini.db".to_string()),
            db_max_connections: parse_or(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 5)?,
            environment: get("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            frontend_url,
            store_timeout: Duration::from_secs(store_timeout_secs),
            telegram,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Full webhook URL, if a public base is known.
    pub fn webhook_url(&self) -> Option<String> {
        let base = self.telegram.as_ref()?.webhook_base_url.as_deref()?;
        Some(format!("{}/api/webhook", base.trim_end_matches('/')))
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        None => Ok(default),
        Some(v) => v
            .parse()
            .with_context(|| format!("invalid value {v:?} for {key}")),
    }
}

// Deployments list several public URLs; the last one is the canonical host.
fn last_entry(raw: &str) -> Option<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_bot_disabled() {
        let config = load(&[("DISABLE_TELEGRAM_BOT", "true")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.database_url, "sqlite:petamini.db");
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert!(config.telegram.is_none());
        assert!(!config.is_production());
        assert!(config.webhook_url().is_none());
    }

    #[test]
    fn test_token_required_unless_disabled() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = load(&[("DISABLE_TELEGRAM_BOT", "true"), ("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));

        assert!(load(&[("DISABLE_TELEGRAM_BOT", "true"), ("STORE_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn test_webhook_url_uses_last_listed_base() {
        let config = load(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_BOT_USERNAME", "petabot"),
            ("ENVIRONMENT", "production"),
            ("FRONTEND_URL", "https://a.example, https://b.example/"),
        ])
        .unwrap();
        assert!(config.is_production());
        assert_eq!(config.webhook_url().as_deref(), Some("https://b.example/api/webhook"));

        let config = load(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("BACKEND_URL", "https://api.example"),
            ("WEBHOOK_SECRET", "s3cret"),
        ])
        .unwrap();
        assert_eq!(config.webhook_url().as_deref(), Some("https://api.example/api/webhook"));
        let telegram = config.telegram.unwrap();
        assert_eq!(telegram.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(telegram.bot_username, "");
    }
}
