// In-memory stand-in for the calendar API, shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use calsync::utils::clock::ManualClock;
use calsync::{
    AppError, AppResult, Calendar, CalendarChanges, Config, Database, DisplayZone, Event,
    EventChanges, RemoteApi, Repository, Source, SourceChanges,
};
use chrono::{DateTime, TimeZone, Utc};

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub fn source(id: &str, name: &str) -> Source {
    Source {
        id: id.into(),
        name: name.into(),
        settings: None,
        auth: None,
    }
}

pub fn calendar(source: &str, id: &str, name: &str) -> Calendar {
    let mut calendar = Calendar::new(source, name);
    calendar.id = id.into();
    calendar
}

pub fn event(calendar: &str, id: &str, start: DateTime<Utc>, hours: i64) -> Event {
    let mut event = Event::new(calendar, id, start, start + chrono::Duration::hours(hours));
    event.id = id.into();
    event
}

#[derive(Default)]
struct Data {
    sources: Vec<Source>,
    calendars: HashMap<String, Vec<Calendar>>,
    events: HashMap<String, Vec<Event>>,
    failures: HashMap<String, (u16, String)>,
    calls: HashMap<String, usize>,
}

/// Keeps sources, calendars and events in memory. Failures are injected
/// per `"<method>:<id>"` key and stay until cleared.
#[derive(Default)]
pub struct FakeApi {
    data: Mutex<Data>,
    next_id: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_source(&self, source: Source) {
        let mut data = self.data.lock().unwrap();
        data.calendars.entry(source.id.clone()).or_default();
        data.sources.push(source);
    }

    pub fn add_calendar(&self, calendar: Calendar) {
        let mut data = self.data.lock().unwrap();
        data.events.entry(calendar.id.clone()).or_default();
        data.calendars
            .entry(calendar.source.clone())
            .or_default()
            .push(calendar);
    }

    pub fn add_event(&self, event: Event) {
        let mut data = self.data.lock().unwrap();
        data.events.entry(event.calendar.clone()).or_default().push(event);
    }

    pub fn remove_source(&self, id: &str) {
        let mut data = self.data.lock().unwrap();
        data.sources.retain(|s| s.id != id);
        data.calendars.remove(id);
    }

    pub fn fail(&self, key: &str, status: u16, message: &str) {
        self.data
            .lock()
            .unwrap()
            .failures
            .insert(key.to_string(), (status, message.to_string()));
    }

    pub fn clear_failure(&self, key: &str) {
        self.data.lock().unwrap().failures.remove(key);
    }

    /// Makes every `list_events` call take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self, key: &str) -> usize {
        self.data.lock().unwrap().calls.get(key).copied().unwrap_or(0)
    }

    fn record(&self, method: &str, id: &str) -> AppResult<()> {
        let mut data = self.data.lock().unwrap();
        *data.calls.entry(method.to_string()).or_default() += 1;
        *data.calls.entry(format!("{}:{}", method, id)).or_default() += 1;
        match data.failures.get(&format!("{}:{}", method, id)) {
            Some((status, message)) => Err(AppError::server(*status, message.clone())),
            None => Ok(()),
        }
    }

    fn new_id(&self, prefix: &str) -> String {
        format!("{}-new-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn list_sources(&self) -> AppResult<Vec<Source>> {
        self.record("list_sources", "")?;
        let data = self.data.lock().unwrap();
        Ok(data
            .sources
            .iter()
            .map(|s| source(&s.id, &s.name))
            .collect())
    }

    async fn get_source(&self, id: &str) -> AppResult<Source> {
        self.record("get_source", id)?;
        let data = self.data.lock().unwrap();
        data.sources
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| AppError::server(404, "Source not found"))
    }

    async fn create_source(&self, source: &Source) -> AppResult<String> {
        self.record("create_source", "")?;
        let mut created = source.clone();
        created.id = self.new_id("s");
        let id = created.id.clone();
        self.add_source(created);
        Ok(id)
    }

    async fn edit_source(&self, source: &Source, _changes: SourceChanges) -> AppResult<()> {
        self.record("edit_source", &source.id)?;
        let mut data = self.data.lock().unwrap();
        if let Some(existing) = data.sources.iter_mut().find(|s| s.id == source.id) {
            *existing = source.clone();
        }
        Ok(())
    }

    async fn delete_source(&self, id: &str) -> AppResult<()> {
        self.record("delete_source", id)?;
        self.remove_source(id);
        Ok(())
    }

    async fn list_calendars(&self, source: &str) -> AppResult<Vec<Calendar>> {
        self.record("list_calendars", source)?;
        let data = self.data.lock().unwrap();
        Ok(data.calendars.get(source).cloned().unwrap_or_default())
    }

    async fn create_calendar(&self, calendar: &Calendar) -> AppResult<String> {
        self.record("create_calendar", &calendar.source)?;
        let mut created = calendar.clone();
        created.id = self.new_id("c");
        let id = created.id.clone();
        self.add_calendar(created);
        Ok(id)
    }

    async fn edit_calendar(&self, calendar: &Calendar, _changes: CalendarChanges) -> AppResult<()> {
        self.record("edit_calendar", &calendar.id)
    }

    async fn delete_calendar(&self, id: &str) -> AppResult<()> {
        self.record("delete_calendar", id)?;
        let mut data = self.data.lock().unwrap();
        for calendars in data.calendars.values_mut() {
            calendars.retain(|c| c.id != id);
        }
        data.events.remove(id);
        Ok(())
    }

    async fn list_events(
        &self,
        calendar: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<Event>> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record("list_events", calendar)?;
        let data = self.data.lock().unwrap();
        Ok(data
            .events
            .get(calendar)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.overlaps(start, end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_event(&self, event: &Event) -> AppResult<String> {
        self.record("create_event", &event.calendar)?;
        let mut created = event.clone();
        created.id = self.new_id("e");
        let id = created.id.clone();
        self.add_event(created);
        Ok(id)
    }

    async fn edit_event(&self, event: &Event, _changes: EventChanges) -> AppResult<()> {
        self.record("edit_event", &event.id)?;
        let mut data = self.data.lock().unwrap();
        for events in data.events.values_mut() {
            events.retain(|e| e.id != event.id);
        }
        data.events
            .entry(event.calendar.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn delete_event(&self, id: &str) -> AppResult<()> {
        self.record("delete_event", id)?;
        let mut data = self.data.lock().unwrap();
        let before: usize = data.events.values().map(Vec::len).sum();
        for events in data.events.values_mut() {
            events.retain(|e| e.id != id);
        }
        let after: usize = data.events.values().map(Vec::len).sum();
        if before == after {
            return Err(AppError::server(404, "Event not found"));
        }
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        zone: DisplayZone::Named(chrono_tz::UTC),
        ..Config::default()
    }
}

pub async fn connect(api: Arc<FakeApi>, db: Database, clock: Arc<ManualClock>) -> Repository {
    Repository::connect(test_config(), api, db, clock).await.unwrap()
}
