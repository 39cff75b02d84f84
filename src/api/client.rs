// file: src/api/client.rs
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::form::{calendar_form, event_form, source_form, timestamp, Form};
use super::RemoteApi;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Calendar, CalendarChanges, Event, EventChanges, Source, SourceChanges};
use crate::recurrence::DisplayZone;
use crate::utils::logging::log_fetch;
use crate::utils::retry::{retry_with_exponential_backoff, RetryConfig};

#[derive(Deserialize)]
struct CalendarsResponse {
    calendars: Vec<Calendar>,
}

#[derive(Deserialize)]
struct EventsResponse {
    events: Vec<Event>,
}

#[derive(Deserialize)]
struct CreatedResponse {
    id: String,
}

/// Turns a non-2xx response into `AppError::Server`, preferring the body's
/// `error` field, then `message`, then the status line.
async fn check(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: Option<Value> = response.json().await.ok();
    let from_body = |field: &str| {
        body.as_ref()
            .and_then(|b| b.get(field))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let message = from_body("error")
        .or_else(|| from_body("message"))
        .unwrap_or_else(|| {
            format!(
                "{} ({})",
                status.canonical_reason().unwrap_or("Could not contact server"),
                status.as_u16()
            )
        });

    Err(AppError::server(status.as_u16(), message))
}

/// `RemoteApi` over HTTP with `reqwest`.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
    token: Option<String>,
    retry: RetryConfig,
    zone: DisplayZone,
}

impl ApiClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        Ok(Self {
            client: config.http.build_client()?,
            base: config.api_url.clone(),
            token: config.api_token.clone(),
            retry: config.http.to_retry_config(),
            zone: config.zone,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::config(format!("API URL {} cannot take a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// GETs and decodes JSON, retrying transient failures.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> AppResult<T> {
        retry_with_exponential_backoff(&self.retry, || {
            let request = self.request(Method::GET, url.clone());
            async move {
                let response = check(request.send().await?).await?;
                Ok(response.json::<T>().await?)
            }
        })
        .await
    }

    /// Sends a mutating request exactly once.
    async fn send(&self, method: Method, url: Url, form: Option<Form>) -> AppResult<Response> {
        let mut request = self.request(method, url);
        if let Some(form) = form {
            request = request.form(&form);
        }
        check(request.send().await?).await
    }

    async fn create(&self, url: Url, form: Form) -> AppResult<String> {
        let response = self.send(Method::PUT, url, Some(form)).await?;
        let created: CreatedResponse = response.json().await?;
        Ok(created.id)
    }
}

#[async_trait]
impl RemoteApi for ApiClient {
    async fn list_sources(&self) -> AppResult<Vec<Source>> {
        let started = Instant::now();
        let sources: Vec<Source> = self.get_json(self.endpoint(&["sources"])?).await?;
        log_fetch("sources", "all", sources.len(), started.elapsed().as_millis() as u64);
        Ok(sources)
    }

    async fn get_source(&self, id: &str) -> AppResult<Source> {
        self.get_json(self.endpoint(&["sources", id])?).await
    }

    async fn create_source(&self, source: &Source) -> AppResult<String> {
        let form = source_form(source, SourceChanges::all())?;
        self.create(self.endpoint(&["sources"])?, form).await
    }

    async fn edit_source(&self, source: &Source, changes: SourceChanges) -> AppResult<()> {
        let form = source_form(source, changes)?;
        self.send(Method::PATCH, self.endpoint(&["sources", &source.id])?, Some(form))
            .await?;
        Ok(())
    }

    async fn delete_source(&self, id: &str) -> AppResult<()> {
        self.send(Method::DELETE, self.endpoint(&["sources", id])?, None).await?;
        Ok(())
    }

    async fn list_calendars(&self, source: &str) -> AppResult<Vec<Calendar>> {
        let started = Instant::now();
        let response: CalendarsResponse = self
            .get_json(self.endpoint(&["sources", source, "calendars"])?)
            .await?;
        log_fetch("calendars", source, response.calendars.len(), started.elapsed().as_millis() as u64);
        Ok(response.calendars)
    }

    async fn create_calendar(&self, calendar: &Calendar) -> AppResult<String> {
        let form = calendar_form(calendar, CalendarChanges::all());
        self.create(self.endpoint(&["sources", &calendar.source, "calendars"])?, form)
            .await
    }

    async fn edit_calendar(&self, calendar: &Calendar, changes: CalendarChanges) -> AppResult<()> {
        let form = calendar_form(calendar, changes);
        self.send(Method::PATCH, self.endpoint(&["calendars", &calendar.id])?, Some(form))
            .await?;
        Ok(())
    }

    async fn delete_calendar(&self, id: &str) -> AppResult<()> {
        self.send(Method::DELETE, self.endpoint(&["calendars", id])?, None).await?;
        Ok(())
    }

    async fn list_events(
        &self,
        calendar: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<Event>> {
        let started = Instant::now();
        let mut url = self.endpoint(&["calendars", calendar, "events"])?;
        url.query_pairs_mut()
            .append_pair("start", &timestamp(start))
            .append_pair("end", &timestamp(end));

        let response: EventsResponse = self.get_json(url).await?;
        log_fetch("events", calendar, response.events.len(), started.elapsed().as_millis() as u64);
        Ok(response.events)
    }

    async fn create_event(&self, event: &Event) -> AppResult<String> {
        let form = event_form(event, EventChanges::all(), self.zone);
        self.create(self.endpoint(&["calendars", &event.calendar, "events"])?, form)
            .await
    }

    async fn edit_event(&self, event: &Event, changes: EventChanges) -> AppResult<()> {
        let form = event_form(event, changes, self.zone);
        self.send(Method::PATCH, self.endpoint(&["events", &event.id])?, Some(form))
            .await?;
        Ok(())
    }

    async fn delete_event(&self, id: &str) -> AppResult<()> {
        self.send(Method::DELETE, self.endpoint(&["events", id])?, None).await?;
        Ok(())
    }
}
