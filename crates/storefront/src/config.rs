//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `IZAJ_API_BASE_URL` - Base URL of the storefront API (e.g. `https://izaj.ph/api`)
//!
//! ## Optional
//! - `IZAJ_POLL_INTERVAL_SECS` - Notification poll interval (default: 30)
//! - `IZAJ_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 15)
//! - `IZAJ_STATE_DIR` - Directory of the remembered session file (default: .izaj)
//! - `IZAJ_NOTIFICATION_PAGE_SIZE` - Notifications fetched per poll (default: 50)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_STATE_DIR: &str = ".izaj";
const DEFAULT_PAGE_SIZE: u32 = 50;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Session and notification client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every API path is resolved against
    pub api_base_url: Url,
    /// Interval between notification polls
    pub poll_interval: Duration,
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
    /// Directory holding the remembered session file
    pub state_dir: PathBuf,
    /// Page size used by the poll and the initial fetch
    pub notification_page_size: u32,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base_url = lookup("IZAJ_API_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("IZAJ_API_BASE_URL".to_string()))?;
        let api_base_url = Url::parse(api_base_url.trim()).map_err(|e| {
            ConfigError::InvalidEnvVar("IZAJ_API_BASE_URL".to_string(), e.to_string())
        })?;
        if !matches!(api_base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEnvVar(
                "IZAJ_API_BASE_URL".to_string(),
                format!("unsupported scheme {}", api_base_url.scheme()),
            ));
        }

        let poll_secs: u64 = parse_or_default(
            &lookup,
            "IZAJ_POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
        )?;
        let timeout_secs: u64 = parse_or_default(
            &lookup,
            "IZAJ_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let page_size: u32 =
            parse_or_default(&lookup, "IZAJ_NOTIFICATION_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;

        for (key, value) in [
            ("IZAJ_POLL_INTERVAL_SECS", poll_secs),
            ("IZAJ_REQUEST_TIMEOUT_SECS", timeout_secs),
            ("IZAJ_NOTIFICATION_PAGE_SIZE", u64::from(page_size)),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidEnvVar(
                    key.to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
        }

        let state_dir = lookup("IZAJ_STATE_DIR")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_STATE_DIR), PathBuf::from);

        Ok(Self {
            api_base_url,
            poll_interval: Duration::from_secs(poll_secs),
            request_timeout: Duration::from_secs(timeout_secs),
            state_dir,
            notification_page_size: page_size,
            sentry_dsn: lookup("SENTRY_DSN").filter(|v| !v.is_empty()),
            sentry_environment: lookup("SENTRY_ENVIRONMENT").filter(|v| !v.is_empty()),
        })
    }

    /// Configuration with defaults for everything but the base URL.
    #[must_use]
    pub fn with_base_url(api_base_url: Url) -> Self {
        Self {
            api_base_url,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            notification_page_size: DEFAULT_PAGE_SIZE,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_or_default<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        _ => Ok(default),
    }
}
