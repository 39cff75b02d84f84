//! HTTP client configuration module
//!
//! Timeouts, retry policy and connection settings for the calendar API
//! client.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

use crate::error::AppResult;
use crate::utils::retry::RetryConfig;

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Total request timeout
    pub timeout: Duration,
    /// Maximum number of attempts for idempotent (GET) requests
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_retry_delay: Duration,
    /// Maximum retry delay
    pub max_retry_delay: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Sent as the `User-Agent` header
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(45),
            max_retries: 3,
            base_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            user_agent: concat!("calsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    /// Create default HTTP config
    pub fn new() -> Self {
        Self::default()
    }

    /// Config for the calendar API. Event queries proxy to remote CalDAV
    /// servers, so they get a generous timeout.
    pub fn calendar_api() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            timeout: Duration::from_secs(90),
            base_retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_secs(20),
            ..Self::default()
        }
    }

    /// Config that never retries. Used by tests against mock servers.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    /// Build a reqwest client with this configuration
    pub fn build_client(&self) -> AppResult<Client> {
        Ok(ClientBuilder::new()
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()?)
    }

    /// Retry policy for GET requests
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            base_delay: self.base_retry_delay,
            max_delay: self.max_retry_delay,
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}
