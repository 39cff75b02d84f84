// file: src/repository/fetch.rs
//! Cache-first reads. Each level answers from fresh cache when it can and
//! otherwise fetches, merges and schedules recompilation and a save.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{debug, info, warn};

use super::Repository;
use crate::cache::DateRange;
use crate::error::{AppError, AppResult};
use crate::models::{Calendar, Event, EventInstance, FetchOutcome, FetchTarget, Source};
use crate::utils::fanout::{at_least_one, Member};
use crate::utils::logging::{log_cache_hit, log_fetch};

fn flatten<T>(outcome: FetchOutcome<Vec<Vec<T>>>) -> FetchOutcome<Vec<T>> {
    FetchOutcome {
        items: outcome.items.into_iter().flatten().collect(),
        failures: outcome.failures,
    }
}

impl Repository {
    /// Emits one warning per failure of `target` members. Failures of
    /// nested members were reported by the level that owns them.
    fn report<T>(
        &self,
        action: &str,
        target: FetchTarget,
        result: AppResult<FetchOutcome<T>>,
    ) -> AppResult<FetchOutcome<T>> {
        let failures = match &result {
            Ok(outcome) => outcome.failures.as_slice(),
            Err(AppError::AllFailed { failures, .. }) => failures.as_slice(),
            Err(_) => &[],
        };
        for failure in failures.iter().filter(|f| f.target == target) {
            self.warn(failure.describe(action), Some(failure.clone()));
        }
        result
    }

    /// Source list, from cache while fresh.
    pub async fn get_sources(&self, force: bool) -> AppResult<Vec<Source>> {
        let now = self.now_ms();
        if !force {
            if let Some(sources) = self.state().cache().fresh_sources(now) {
                log_cache_hit("sources", "all");
                return Ok(sources.clone());
            }
        }

        let _loading = self.inner.tracker.start_loading();
        let started = Instant::now();
        let sources = self.inner.api.list_sources().await?;
        log_fetch("sources", "all", sources.len(), started.elapsed().as_millis() as u64);

        let now = self.now_ms();
        let (removed, dropped_calendars) = {
            let mut cache = self.state().cache();
            let removed = cache.put_sources(now, sources.clone());
            let dropped: Vec<String> = removed.iter().flat_map(|id| cache.remove_source(id)).collect();
            (removed, dropped)
        };

        self.schedule_sources();
        if !removed.is_empty() {
            info!("[Repository] {} source(s) disappeared upstream", removed.len());
            self.state().visibility().forget(&removed, &dropped_calendars);
            self.schedule_calendars();
            self.schedule_events();
        }
        self.schedule_save();
        Ok(sources)
    }

    /// Full source record including settings and auth.
    pub async fn get_source_details(&self, id: &str, force: bool) -> AppResult<Source> {
        let now = self.now_ms();
        if !force {
            if let Some(source) = self.state().cache().fresh_source_details(id, now) {
                log_cache_hit("source details", id);
                return Ok(source.clone());
            }
        }

        let _loading = self.inner.tracker.start_loading_source(id);
        let source = match self.inner.api.get_source(id).await {
            Ok(source) => source,
            Err(e) => {
                let name = self.state().cache().source_name(id);
                self.warn(
                    format!(
                        "Failed to fetch source details for {}: {}",
                        name.as_deref().unwrap_or(id),
                        e.to_safe_string()
                    ),
                    None,
                );
                return Err(e);
            }
        };

        let now = self.now_ms();
        self.state().cache().put_source_details(now, source.clone());
        self.schedule_save();
        Ok(source)
    }

    /// Calendars of one source. A failure marks the source faulty; a
    /// success clears that mark and drops calendars the server no longer
    /// lists, with their events.
    pub async fn get_calendars(&self, source: &str, force: bool) -> AppResult<Vec<Calendar>> {
        let now = self.now_ms();
        if !force {
            if let Some(calendars) = self.state().cache().fresh_calendars(source, now) {
                log_cache_hit("calendars", source);
                return Ok(calendars);
            }
        }

        let _loading = self.inner.tracker.start_loading_source(source);
        let started = Instant::now();
        let calendars = match self.inner.api.list_calendars(source).await {
            Ok(calendars) => calendars,
            Err(e) => {
                warn!("[Fetch] Calendars of source {} failed: {}", source, e);
                self.inner.tracker.add_faulty_source(source, e.to_safe_string());
                return Err(e);
            }
        };
        self.inner.tracker.remove_faulty_source(source);
        log_fetch("calendars", source, calendars.len(), started.elapsed().as_millis() as u64);

        let calendars: Vec<Calendar> = calendars
            .into_iter()
            .map(|mut calendar| {
                if calendar.source.is_empty() {
                    calendar.source = source.to_string();
                }
                calendar
            })
            .collect();

        let now = self.now_ms();
        let orphaned = self
            .state()
            .cache()
            .put_calendars(now, source, calendars.clone());

        self.schedule_calendars();
        if !orphaned.is_empty() {
            debug!("[Repository] Dropped {} orphaned calendar(s) of {}", orphaned.len(), source);
            self.state().visibility().forget(&[], &orphaned);
            self.schedule_events();
        }
        self.schedule_save();
        Ok(calendars)
    }

    /// Calendars of every source. Fails only if every source failed.
    pub async fn get_all_calendars(&self, force: bool) -> AppResult<FetchOutcome<Vec<Calendar>>> {
        let sources = self.get_sources(force).await?;
        let members = sources
            .iter()
            .map(|source| Member {
                id: source.id.as_str(),
                name: Some(source.name.as_str()),
                fetch: async move {
                    self.get_calendars(&source.id, force)
                        .await
                        .map(FetchOutcome::complete)
                },
            })
            .collect();

        let result = at_least_one(FetchTarget::Source, "calendars", members).await;
        self.report("fetch calendars", FetchTarget::Source, result)
            .map(flatten)
    }

    /// Sets the active range to the widened `start..end`, then fetches
    /// events of every visible calendar of every source over it.
    pub async fn get_all_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        force: bool,
    ) -> AppResult<FetchOutcome<Vec<EventInstance>>> {
        let range = DateRange::new(start, end).widened();
        self.state().set_active_range(range);
        self.schedule_events();

        let sources = self.get_sources(force).await?;
        let members = sources
            .iter()
            .map(|source| Member {
                id: source.id.as_str(),
                name: Some(source.name.as_str()),
                fetch: self.get_events_from_source(&source.id, range.start, range.end, force),
            })
            .collect();

        let result = at_least_one(FetchTarget::Source, "events", members).await;
        self.report("fetch events", FetchTarget::Source, result)
            .map(flatten)
    }

    /// Events of the visible calendars of one source over `start..end`.
    pub async fn get_events_from_source(
        &self,
        source: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        force: bool,
    ) -> AppResult<FetchOutcome<Vec<EventInstance>>> {
        let calendars: Vec<Calendar> = {
            let all = self.get_calendars(source, force).await?;
            let visibility = self.state().visibility();
            all.into_iter()
                .filter(|c| visibility.is_calendar_visible(&c.id))
                .collect()
        };

        let members = calendars
            .iter()
            .map(|calendar| Member {
                id: calendar.id.as_str(),
                name: Some(calendar.name.as_str()),
                fetch: async move {
                    self.get_events_from_calendar(&calendar.id, start, end, force)
                        .await
                        .map(FetchOutcome::complete)
                },
            })
            .collect();

        let result = at_least_one(FetchTarget::Calendar, "events", members).await;
        self.report("fetch events", FetchTarget::Calendar, result)
            .map(flatten)
    }

    /// Events of one calendar over `start..end`. Answered from cache when
    /// every month in the range is fresh; otherwise the whole range is
    /// fetched once. Concurrent calls for the same calendar and range share
    /// one request.
    pub async fn get_events_from_calendar(
        &self,
        calendar: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        force: bool,
    ) -> AppResult<Vec<EventInstance>> {
        let range = DateRange::new(start, end);
        if !force {
            let probe = self.state().cache().probe(calendar, &range, self.now_ms());
            if probe.complete {
                log_cache_hit("events", calendar);
                return Ok(self.project_all(&probe.occurrences));
            }
        }

        let key = (
            calendar.to_string(),
            start.timestamp_millis(),
            end.timestamp_millis(),
        );
        let fetch = {
            let mut in_flight = super::lock(&self.inner.in_flight);
            match in_flight.get(&key) {
                Some(existing) => {
                    debug!("[Fetch] Joining in-flight request for {}", calendar);
                    existing.clone()
                }
                None => {
                    let shared = self
                        .clone()
                        .fetch_calendar_range(calendar.to_string(), range)
                        .map(|result| result.map_err(Arc::new))
                        .boxed()
                        .shared();
                    in_flight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let result = fetch.clone().await;
        {
            let mut in_flight = super::lock(&self.inner.in_flight);
            if in_flight.get(&key).is_some_and(|current| current.ptr_eq(&fetch)) {
                in_flight.remove(&key);
            }
        }
        result.map_err(AppError::Shared)
    }

    async fn fetch_calendar_range(
        self,
        calendar: String,
        range: DateRange,
    ) -> AppResult<Vec<EventInstance>> {
        let zone = self.zone();
        let _loading = self.inner.tracker.start_loading_calendar(&calendar);
        let started = Instant::now();

        let query_start = zone.start_of_day(range.start);
        let query_end = zone.end_of_day(range.end);
        let fetched = match self.inner.api.list_events(&calendar, query_start, query_end).await {
            Ok(events) => events,
            Err(e) => {
                warn!("[Fetch] Events of calendar {} failed: {}", calendar, e);
                self.inner.tracker.add_faulty_calendar(&calendar, e.to_safe_string());
                return Err(e);
            }
        };
        self.inner.tracker.remove_faulty_calendar(&calendar);
        log_fetch("events", &calendar, fetched.len(), started.elapsed().as_millis() as u64);

        let fetched: Vec<Event> = fetched
            .into_iter()
            .map(|mut event| {
                if event.calendar.is_empty() {
                    event.calendar = calendar.clone();
                }
                zone.normalize_all_day(&mut event);
                event
            })
            .collect();

        let now = self.now_ms();
        let contributed = self
            .state()
            .cache()
            .record_fetch(now, &calendar, &range, fetched);
        let instances = self.project_all(&contributed);

        self.schedule_events();
        self.schedule_save();
        Ok(instances)
    }

    /// Refreshes the calendars of one source and the events of its visible
    /// calendars over the active range, turning failures into warnings.
    pub async fn refresh_source(&self, source: &str, force: bool) {
        let name = self
            .state()
            .cache()
            .source_name(source)
            .unwrap_or_else(|| source.to_string());

        match self.active_range() {
            Some(range) => {
                if let Err(e) = self
                    .get_events_from_source(source, range.start, range.end, force)
                    .await
                {
                    self.warn(format!("Failed to fetch events from {}: {}", name, e.to_safe_string()), None);
                }
            }
            None => {
                if let Err(e) = self.get_calendars(source, force).await {
                    self.warn(format!("Failed to fetch calendars from {}: {}", name, e.to_safe_string()), None);
                }
            }
        }
    }
}
