use std::sync::Arc;

use thiserror::Error;

use crate::models::FetchFailure;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Error: {0}")]
    Anyhow(#[from] anyhow::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to fetch {what}")]
    AllFailed {
        what: String,
        failures: Vec<FetchFailure>,
    },

    #[error("{0}")]
    Shared(Arc<AppError>),
}

impl AppError {
    pub fn server<S: Into<String>>(status: u16, msg: S) -> Self {
        Self::Server {
            status,
            message: msg.into(),
        }
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn all_failed<S: Into<String>>(what: S, failures: Vec<FetchFailure>) -> Self {
        Self::AllFailed {
            what: what.into(),
            failures,
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Server { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::Shared(inner) => inner.is_transient(),
            _ => false,
        }
    }

    /// True when the server answered, so its state is known.
    pub fn is_server_reported(&self) -> bool {
        match self {
            Self::Server { .. } | Self::NotFound(_) => true,
            Self::Shared(inner) => inner.is_server_reported(),
            _ => false,
        }
    }

    pub fn is_pii_safe(&self) -> bool {
        match self {
            Self::Database(_) | Self::Network(_) | Self::Anyhow(_) | Self::Serialization(_) => false,
            Self::Server { .. }
            | Self::InvalidInput(_)
            | Self::Config(_)
            | Self::NotFound(_)
            | Self::AllFailed { .. } => true,
            Self::Shared(inner) => inner.is_pii_safe(),
        }
    }

    pub fn to_safe_string(&self) -> String {
        if self.is_pii_safe() {
            return self.to_string();
        }
        match self {
            Self::Database(_) => "Database operation failed".to_string(),
            Self::Network(_) => "Could not contact server".to_string(),
            Self::Serialization(_) => "Malformed data".to_string(),
            Self::Shared(inner) => inner.to_safe_string(),
            _ => "Operation failed".to_string(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
