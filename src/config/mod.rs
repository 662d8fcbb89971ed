use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_key: String,
    /// Language passed to the platform's name-search endpoint.
    pub search_lang: String,
    pub store_path: PathBuf,
    /// Challenge count below which the store is considered a first run.
    pub bootstrap_threshold: usize,
    pub challenge_poll: Duration,
    pub user_poll: Duration,
    pub dispatch_poll: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // dotenvy loads .env, but doesn't override already-set env vars
        dotenvy::dotenv().ok();

        let api_key = std::env::var("API_KEY").context("API_KEY must be set")?;

        Ok(Self {
            api_base_url: env_or("API_BASE_URL", "https://api.www.root-me.org"),
            api_key,
            search_lang: env_or("SEARCH_LANG", "en"),
            store_path: PathBuf::from(env_or("STORE_PATH", "tracker-store.json")),
            bootstrap_threshold: parse_env("BOOTSTRAP_THRESHOLD", 300)?,
            challenge_poll: Duration::from_secs(parse_env("CHALLENGE_POLL_SECS", 300)?),
            user_poll: Duration::from_secs(parse_env("USER_POLL_SECS", 1)?),
            dispatch_poll: Duration::from_secs(parse_env("DISPATCH_POLL_SECS", 1)?),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}
