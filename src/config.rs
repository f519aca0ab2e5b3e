//! Process configuration.
//!
//! Built once at startup and handed to constructors. Nothing in the crate
//! reads the environment after `Config::from_env` returns.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub storage_root: PathBuf,
    /// Base URL of the signing front end; sign links are `{frontend_url}/public/{token}`.
    pub frontend_url: String,
    pub max_upload_bytes: usize,
    pub storage_timeout: Duration,
    pub storage_attempts: u32,
    pub retry_backoff: Duration,
    pub annotate_timeout: Duration,
    pub db_max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: String::new(),
            storage_root: PathBuf::from("data/documents"),
            frontend_url: "http://localhost:5173".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
            storage_timeout: Duration::from_secs(10),
            storage_attempts: 3,
            retry_backoff: Duration::from_millis(200),
            annotate_timeout: Duration::from_secs(30),
            db_max_connections: 8,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "Missing required setting {key}"),
            ConfigError::Invalid { key, value } => write!(f, "Invalid value for {key}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load settings from the environment, reading a `.env` file first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("Ignoring unreadable .env file: {e}");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys keep their defaults,
    /// except `DATABASE_URL` which is required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let storage_root = lookup("STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_root);
        let frontend_url = lookup("FRONTEND_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.frontend_url);

        let max_upload_bytes = parse_or(&lookup, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?;
        let storage_timeout = parse_millis_or(&lookup, "STORAGE_TIMEOUT_MS", defaults.storage_timeout)?;
        let storage_attempts: u32 = parse_or(&lookup, "STORAGE_ATTEMPTS", defaults.storage_attempts)?;
        if storage_attempts == 0 {
            return Err(ConfigError::Invalid { key: "STORAGE_ATTEMPTS", value: "0".to_string() });
        }
        let retry_backoff = parse_millis_or(&lookup, "RETRY_BACKOFF_MS", defaults.retry_backoff)?;
        let annotate_timeout = parse_millis_or(&lookup, "ANNOTATE_TIMEOUT_MS", defaults.annotate_timeout)?;
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?;

        Ok(Config {
            database_url,
            storage_root,
            frontend_url,
            max_upload_bytes,
            storage_timeout,
            storage_attempts,
            retry_backoff,
            annotate_timeout,
            db_max_connections,
        })
    }

    pub fn sign_link(&self, token: &str) -> String {
        format!("{}/public/{}", self.frontend_url, token)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn parse_millis_or<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let millis: u64 = parse_or(lookup, key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}
