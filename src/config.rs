//! Configuration module
//!
//! Runtime settings for the sync layer, read from the environment with
//! sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use log::info;
use url::Url;

use crate::error::{AppError, AppResult};
use crate::http_config::HttpConfig;
use crate::recurrence::DisplayZone;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api/";
pub const DEFAULT_MAX_CACHE_AGE: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the calendar API; endpoint paths are joined onto it.
    pub api_url: Url,
    pub api_token: Option<String>,
    pub db_path: PathBuf,
    pub max_cache_age: Duration,
    /// Quiet period before derived collections are recomputed
    pub compile_delay: Duration,
    /// Quiet period before the cache is written to storage
    pub save_delay: Duration,
    /// How often to check storage for saves made by other instances
    pub storage_poll: Option<Duration>,
    pub zone: DisplayZone,
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).unwrap_or_else(|_| unreachable!()),
            api_token: None,
            db_path: default_db_path(),
            max_cache_age: DEFAULT_MAX_CACHE_AGE,
            compile_delay: DEFAULT_QUIET_PERIOD,
            save_delay: DEFAULT_QUIET_PERIOD,
            storage_poll: None,
            zone: DisplayZone::Local,
            http: HttpConfig::calendar_api(),
        }
    }
}

/// `<data dir>/calsync/cache.db`, or `./calsync-cache.db` when the platform
/// has no data directory.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("calsync").join("cache.db"))
        .unwrap_or_else(|| PathBuf::from("calsync-cache.db"))
}

/// Appends a trailing slash so relative joins keep the last path segment.
pub fn normalize_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn parse_secs(name: &str, raw: &str) -> AppResult<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| AppError::config(format!("{} must be a whole number of seconds", name)))
}

impl Config {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url: normalize_base_url(api_url),
            ..Self::default()
        }
    }

    /// Reads `CALSYNC_*` variables over the defaults.
    pub fn from_env() -> AppResult<Self> {
        let mut config = Config::default();

        if let Ok(raw) = env::var("CALSYNC_API_URL") {
            let url = Url::parse(raw.trim())
                .map_err(|e| AppError::config(format!("CALSYNC_API_URL is not a valid URL: {}", e)))?;
            config.api_url = normalize_base_url(url);
        }

        config.api_token = env::var("CALSYNC_API_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        if let Ok(raw) = env::var("CALSYNC_DB_PATH") {
            config.db_path = PathBuf::from(raw);
        }

        if let Ok(raw) = env::var("CALSYNC_TIMEZONE") {
            config.zone = raw.parse()?;
        }

        if let Ok(raw) = env::var("CALSYNC_MAX_CACHE_AGE_SECS") {
            config.max_cache_age = parse_secs("CALSYNC_MAX_CACHE_AGE_SECS", &raw)?;
        }

        if let Ok(raw) = env::var("CALSYNC_STORAGE_POLL_SECS") {
            let poll = parse_secs("CALSYNC_STORAGE_POLL_SECS", &raw)?;
            config.storage_poll = (!poll.is_zero()).then_some(poll);
        }

        validate_config(&config)?;
        Ok(config)
    }

    pub fn max_cache_age_ms(&self) -> i64 {
        self.max_cache_age.as_millis() as i64
    }
}

/// Validates application configuration
///
/// # Returns
///
/// * `Ok(())` - the configuration is usable
/// * `Err(AppError::Config)` - naming the offending setting
pub fn validate_config(config: &Config) -> AppResult<()> {
    match config.api_url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(AppError::config(format!(
                "API URL must use http or https, not '{}'",
                other
            )))
        }
    }

    if config.max_cache_age.is_zero() {
        return Err(AppError::config("Maximum cache age must be greater than zero"));
    }

    if config.http.max_retries == 0 {
        return Err(AppError::config("HTTP retries must allow at least one attempt"));
    }

    info!(
        "Configuration valid (api: {}, db: {})",
        config.api_url,
        config.db_path.display()
    );
    Ok(())
}
