// file: src/cache/mod.rs
//! In-memory cache maps for the source → calendar → event hierarchy.
//!
//! `CacheStore` is plain data: it never talks to the network and never
//! reads the wall clock. Callers pass `now` in milliseconds so that the
//! freshness rule is driven by whatever `Clock` the repository was built
//! with.

pub mod events;
pub mod months;
pub mod snapshot;

use std::collections::{BTreeMap, HashMap};

use crate::models::{CacheEntry, Calendar, Event, MonthKey, Occurrence, Source};

pub use months::{determine_spanned_months, month_key, spanned_months, DateRange};
pub use snapshot::CacheSnapshot;

/// Month buckets of one calendar, ordered by month.
pub type Buckets = BTreeMap<MonthKey, CacheEntry<Vec<Occurrence>>>;

#[derive(Debug, Clone)]
pub struct CacheStore {
    pub(crate) sources: CacheEntry<Vec<Source>>,
    pub(crate) source_details: HashMap<String, CacheEntry<Source>>,
    pub(crate) calendars: HashMap<String, CacheEntry<Vec<String>>>,
    pub(crate) calendars_by_id: HashMap<String, Calendar>,
    pub(crate) events: HashMap<String, Buckets>,
    pub(crate) templates: HashMap<String, Event>,
    max_age_ms: i64,
}

impl CacheStore {
    pub fn new(max_age_ms: i64) -> Self {
        Self {
            sources: CacheEntry::empty(),
            source_details: HashMap::new(),
            calendars: HashMap::new(),
            calendars_by_id: HashMap::new(),
            events: HashMap::new(),
            templates: HashMap::new(),
            max_age_ms,
        }
    }

    pub fn max_age_ms(&self) -> i64 {
        self.max_age_ms
    }

    /// Zeroes every timestamp; values stay as fallback until refetched.
    pub fn invalidate_all(&mut self) {
        self.sources.invalidate();
        self.source_details.values_mut().for_each(CacheEntry::invalidate);
        self.calendars.values_mut().for_each(CacheEntry::invalidate);
        self.events
            .values_mut()
            .flat_map(|buckets| buckets.values_mut())
            .for_each(CacheEntry::invalidate);
    }

    // ----- sources -----

    pub fn fresh_sources(&self, now: i64) -> Option<&Vec<Source>> {
        self.sources.fresh(now, self.max_age_ms)
    }

    /// Whatever source list is cached, fresh or not.
    pub fn cached_sources(&self) -> &[Source] {
        self.sources.value.as_deref().unwrap_or(&[])
    }

    pub fn source(&self, id: &str) -> Option<&Source> {
        self.cached_sources().iter().find(|s| s.id == id)
    }

    pub fn source_name(&self, id: &str) -> Option<String> {
        self.source(id).map(|s| s.name.clone())
    }

    /// Stores a fresh source list. Returns the ids of sources that were
    /// cached before but are no longer listed.
    pub fn put_sources(&mut self, now: i64, sources: Vec<Source>) -> Vec<String> {
        let removed: Vec<String> = self
            .cached_sources()
            .iter()
            .filter(|old| !sources.iter().any(|s| s.id == old.id))
            .map(|s| s.id.clone())
            .collect();
        self.sources = CacheEntry::new(now, sources);
        removed
    }

    pub fn fresh_source_details(&self, id: &str, now: i64) -> Option<&Source> {
        self.source_details
            .get(id)
            .and_then(|entry| entry.fresh(now, self.max_age_ms))
    }

    pub fn put_source_details(&mut self, now: i64, source: Source) {
        self.source_details
            .insert(source.id.clone(), CacheEntry::new(now, source));
    }

    /// Appends a newly created source, keeping the list's timestamp.
    pub fn add_source(&mut self, now: i64, source: Source) {
        self.source_details
            .insert(source.id.clone(), CacheEntry::new(now, source.clone()));
        self.sources.value.get_or_insert_with(Vec::new).push(source);
    }

    /// Replaces a source in the list and in the details map.
    pub fn replace_source(&mut self, now: i64, source: Source) {
        if let Some(list) = self.sources.value.as_mut() {
            if let Some(slot) = list.iter_mut().find(|s| s.id == source.id) {
                *slot = source.clone();
            }
        }
        self.put_source_details(now, source);
    }

    /// Removes a source together with its calendars, their buckets and
    /// their templates. Returns the removed calendar ids.
    pub fn remove_source(&mut self, id: &str) -> Vec<String> {
        if let Some(list) = self.sources.value.as_mut() {
            list.retain(|s| s.id != id);
        }
        self.source_details.remove(id);

        let calendar_ids = self
            .calendars
            .remove(id)
            .and_then(|entry| entry.value)
            .unwrap_or_default();
        for calendar in &calendar_ids {
            self.drop_calendar_data(calendar);
        }
        calendar_ids
    }

    // ----- calendars -----

    /// Calendars of `source` if its id list is fresh. Ids that no longer
    /// resolve are skipped.
    pub fn fresh_calendars(&self, source: &str, now: i64) -> Option<Vec<Calendar>> {
        let ids = self
            .calendars
            .get(source)
            .and_then(|entry| entry.fresh(now, self.max_age_ms))?;
        Some(self.resolve_calendars(ids))
    }

    /// Calendars of `source` regardless of freshness.
    pub fn cached_calendars(&self, source: &str) -> Vec<Calendar> {
        self.calendars
            .get(source)
            .and_then(|entry| entry.value.as_ref())
            .map(|ids| self.resolve_calendars(ids))
            .unwrap_or_default()
    }

    fn resolve_calendars(&self, ids: &[String]) -> Vec<Calendar> {
        ids.iter()
            .filter_map(|id| self.calendars_by_id.get(id).cloned())
            .collect()
    }

    pub fn calendar(&self, id: &str) -> Option<&Calendar> {
        self.calendars_by_id.get(id)
    }

    /// Every calendar id listed under any source.
    pub fn all_calendar_ids(&self) -> Vec<String> {
        self.calendars
            .values()
            .filter_map(|entry| entry.value.as_ref())
            .flatten()
            .cloned()
            .collect()
    }

    /// Stores a fresh calendar list for `source`. Calendars that were listed
    /// before but are missing now lose their buckets and templates; their
    /// ids are returned.
    pub fn put_calendars(&mut self, now: i64, source: &str, calendars: Vec<Calendar>) -> Vec<String> {
        let previous = self
            .calendars
            .get(source)
            .and_then(|entry| entry.value.clone())
            .unwrap_or_default();
        let ids: Vec<String> = calendars.iter().map(|c| c.id.clone()).collect();

        let orphaned: Vec<String> = previous.into_iter().filter(|id| !ids.contains(id)).collect();
        for id in &orphaned {
            self.drop_calendar_data(id);
        }

        for calendar in calendars {
            self.calendars_by_id.insert(calendar.id.clone(), calendar);
        }
        self.calendars.insert(source.to_string(), CacheEntry::new(now, ids));
        orphaned
    }

    /// Appends a newly created calendar to its source's list.
    pub fn add_calendar(&mut self, calendar: Calendar) {
        let entry = self
            .calendars
            .entry(calendar.source.clone())
            .or_insert_with(CacheEntry::empty);
        let ids = entry.value.get_or_insert_with(Vec::new);
        if !ids.contains(&calendar.id) {
            ids.push(calendar.id.clone());
        }
        self.calendars_by_id.insert(calendar.id.clone(), calendar);
    }

    pub fn replace_calendar(&mut self, calendar: Calendar) {
        self.calendars_by_id.insert(calendar.id.clone(), calendar);
    }

    /// Removes a calendar from its source's list and drops its buckets and
    /// templates.
    pub fn remove_calendar(&mut self, id: &str) -> Option<Calendar> {
        let calendar = self.calendars_by_id.get(id).cloned();
        for entry in self.calendars.values_mut() {
            if let Some(ids) = entry.value.as_mut() {
                ids.retain(|c| c != id);
            }
        }
        self.drop_calendar_data(id);
        calendar
    }

    fn drop_calendar_data(&mut self, id: &str) {
        self.calendars_by_id.remove(id);
        self.events.remove(id);
        self.templates.retain(|_, event| event.calendar != id);
    }

    // ----- templates -----

    pub fn template(&self, id: &str) -> Option<&Event> {
        self.templates.get(id)
    }

    pub fn templates(&self) -> &HashMap<String, Event> {
        &self.templates
    }

    pub fn buckets(&self, calendar: &str) -> Option<&Buckets> {
        self.events.get(calendar)
    }
}
