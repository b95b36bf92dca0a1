use anyhow::{Context, Result};

/// Placeholder keys shipped in sample `.env` files. Treated the same as an absent key.
const PLACEHOLDER_API_KEYS: &[&str] = &[
    "your_google_places_api_key",
    "YOUR_GOOGLE_PLACES_API_KEY",
    "your-api-key",
    "changeme",
];

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub db_max_connections: u32,
    /// `None` puts lead discovery in mock mode.
    pub google_places_api_key: Option<String>,
    pub places_base_url: String,
    pub search_radius_meters: u32,
    pub evolution: Option<EvolutionConfig>,
    pub http_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

/// Connection settings for the Evolution API WhatsApp gateway.
#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    pub base_url: String,
    pub api_key: String,
    pub instance: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let evolution = match (
            optional_env("EVOLUTION_API_URL"),
            optional_env("EVOLUTION_API_KEY"),
            optional_env("EVOLUTION_INSTANCE"),
        ) {
            (Some(base_url), Some(api_key), Some(instance)) => Some(EvolutionConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
                instance,
            }),
            _ => None,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 10)?,
            google_places_api_key: usable_api_key(optional_env("GOOGLE_PLACES_API_KEY")),
            places_base_url: optional_env("PLACES_BASE_URL")
                .unwrap_or_else(|| "https://maps.googleapis.com/maps/api".to_string()),
            search_radius_meters: parse_env("SEARCH_RADIUS_METERS", 10_000)?,
            evolution,
            http_timeout_secs: parse_env("HTTP_TIMEOUT_SECS", 15)?,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30)?,
        })
    }
}

/// Drops blank and placeholder keys so callers only ever see a real credential.
pub fn usable_api_key(key: Option<String>) -> Option<String> {
    key.filter(|k| !k.trim().is_empty() && !PLACEHOLDER_API_KEYS.contains(&k.trim()))
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}
