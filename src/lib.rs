// calsync library
// Client-side cache and sync layer for a calendar aggregation API

pub mod api;
pub mod cache;
pub mod compile;
pub mod config;
pub mod database;
pub mod error;
pub mod http_config;
pub mod models;
pub mod recurrence;
pub mod repository;
pub mod tracker;
pub mod utils;
pub mod visibility;

// Re-export commonly used types
pub use api::{ApiClient, RemoteApi};
pub use cache::DateRange;
pub use config::Config;
pub use database::Database;
pub use error::{AppError, AppResult};
pub use models::*;
pub use recurrence::DisplayZone;
pub use repository::Repository;
pub use tracker::{LoadingHandle, LoadingSnapshot, LoadingTracker};
pub use visibility::Visibility;
