// file: src/api/mod.rs
//! Boundary to the remote calendar API.

pub mod client;
pub mod form;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::models::{Calendar, CalendarChanges, Event, EventChanges, Source, SourceChanges};

pub use client::ApiClient;

/// One method per endpoint. Implementations report transport failures as
/// `AppError::Network` and non-2xx answers as `AppError::Server`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// `GET /sources`: id and name of every source.
    async fn list_sources(&self) -> AppResult<Vec<Source>>;
    /// `GET /sources/{id}`: settings and auth included.
    async fn get_source(&self, id: &str) -> AppResult<Source>;
    /// `PUT /sources`, returning the new id.
    async fn create_source(&self, source: &Source) -> AppResult<String>;
    async fn edit_source(&self, source: &Source, changes: SourceChanges) -> AppResult<()>;
    async fn delete_source(&self, id: &str) -> AppResult<()>;

    async fn list_calendars(&self, source: &str) -> AppResult<Vec<Calendar>>;
    async fn create_calendar(&self, calendar: &Calendar) -> AppResult<String>;
    async fn edit_calendar(&self, calendar: &Calendar, changes: CalendarChanges) -> AppResult<()>;
    async fn delete_calendar(&self, id: &str) -> AppResult<()>;

    /// `GET /calendars/{id}/events?start=..&end=..`
    async fn list_events(
        &self,
        calendar: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<Event>>;
    async fn create_event(&self, event: &Event) -> AppResult<String>;
    async fn edit_event(&self, event: &Event, changes: EventChanges) -> AppResult<()>;
    async fn delete_event(&self, id: &str) -> AppResult<()>;
}
