// Service configuration loaded from the environment

use crate::models::DEFAULT_LIMIT;
use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub chesscom_api_url: String,
    pub port: u16,
    pub http_timeout: Duration,
    pub page_size: i64,
    pub user_agent: String,
}

impl Config {
    /// Read configuration from process environment (after `.env`)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = var("PORT", "4000")
            .parse::<u16>()
            .context("PORT must be a valid port number")?;
        let timeout_secs = var("HTTP_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .context("HTTP_TIMEOUT_SECS must be a number of seconds")?;
        let page_size = var("PAGE_SIZE", &DEFAULT_LIMIT.to_string())
            .parse::<i64>()
            .context("PAGE_SIZE must be a number")?;
        anyhow::ensure!(page_size > 0, "PAGE_SIZE must be positive");

        Ok(Self {
            database_url: var("DATABASE_URL", "sqlite:chess_cache.db"),
            chesscom_api_url: var("CHESSCOM_API_URL", "https://api.chess.com"),
            port,
            http_timeout: Duration::from_secs(timeout_secs),
            page_size,
            user_agent: var(
                "USER_AGENT",
                concat!("chess-cache/", env!("CARGO_PKG_VERSION")),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_url, "sqlite:chess_cache.db");
        assert_eq!(config.chesscom_api_url, "https://api.chess.com");
        assert_eq!(config.port, 4000);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.page_size, 5);
        assert!(config.user_agent.starts_with("chess-cache/"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("PAGE_SIZE", "10"),
            ("HTTP_TIMEOUT_SECS", "3"),
            ("CHESSCOM_API_URL", "http://localhost:9000"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.http_timeout, Duration::from_secs(3));
        assert_eq!(config.chesscom_api_url, "http://localhost:9000");
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("PORT", "eighty")])).is_err());
        assert!(Config::from_lookup(lookup(&[("PAGE_SIZE", "0")])).is_err());
    }
}
