// file: src/cache/events.rs
//! Month-bucket index operations on `CacheStore`.

use std::collections::HashSet;

use super::months::{determine_spanned_months, spanned_months, DateRange};
use super::CacheStore;
use crate::models::{CacheEntry, Event, MonthKey, Occurrence};

/// What the cache could answer for one calendar and range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheProbe {
    /// Occurrences from the fresh buckets at both ends of the range.
    pub occurrences: Vec<Occurrence>,
    /// True when every month of the range had a fresh bucket.
    pub complete: bool,
}

fn push_unique(bucket: &mut Vec<Occurrence>, occurrence: Occurrence) {
    if !bucket.contains(&occurrence) {
        bucket.push(occurrence);
    }
}

impl CacheStore {
    pub fn fresh_bucket(&self, calendar: &str, month: MonthKey, now: i64) -> Option<&Vec<Occurrence>> {
        self.events
            .get(calendar)?
            .get(&month)?
            .fresh(now, self.max_age_ms())
    }

    /// Walks inward from both ends of `range`, consuming fresh buckets until
    /// each walk hits a stale or missing one.
    pub fn probe(&self, calendar: &str, range: &DateRange, now: i64) -> CacheProbe {
        let months = range.months();
        let mut occurrences = Vec::new();

        let mut front = 0;
        while front < months.len() {
            match self.fresh_bucket(calendar, months[front], now) {
                Some(bucket) => occurrences.extend(bucket.iter().cloned()),
                None => break,
            }
            front += 1;
        }

        let mut back = months.len();
        while back > front {
            match self.fresh_bucket(calendar, months[back - 1], now) {
                Some(bucket) => occurrences.extend(bucket.iter().cloned()),
                None => break,
            }
            back -= 1;
        }

        CacheProbe {
            occurrences,
            complete: front >= back,
        }
    }

    /// Merges one network response for `calendar` over `range`. Every month
    /// of the range gets a fresh bucket, empty if nothing landed in it.
    /// Occurrences spilling into months outside the range are added to
    /// those buckets without making them fresh.
    ///
    /// Returns the occurrence pairs contributed by this response.
    pub fn record_fetch(
        &mut self,
        now: i64,
        calendar: &str,
        range: &DateRange,
        fetched: Vec<Event>,
    ) -> Vec<Occurrence> {
        let buckets = self.events.entry(calendar.to_string()).or_default();
        for month in range.months() {
            buckets.insert(month, CacheEntry::new(now, Vec::new()));
        }

        let mut seen = HashSet::new();
        let mut contributed = Vec::with_capacity(fetched.len());
        for item in fetched {
            let occurrence = Occurrence::new(item.id.clone(), item.date.start);
            let months = spanned_months(item.date.start, item.date.end);
            if seen.insert(item.id.clone()) {
                self.templates.insert(item.id.clone(), item);
            }
            self.add_occurrence(calendar, &months, &occurrence);
            contributed.push(occurrence);
        }
        contributed
    }

    fn add_occurrence(&mut self, calendar: &str, months: &[MonthKey], occurrence: &Occurrence) {
        let buckets = self.events.entry(calendar.to_string()).or_default();
        for month in months {
            let entry = buckets.entry(*month).or_insert_with(|| CacheEntry::stale(Vec::new()));
            push_unique(entry.value.get_or_insert_with(Vec::new), occurrence.clone());
        }
    }

    fn remove_id_from_months(&mut self, calendar: &str, months: &[MonthKey], id: &str) {
        if let Some(buckets) = self.events.get_mut(calendar) {
            for month in months {
                if let Some(bucket) = buckets.get_mut(month).and_then(|e| e.value.as_mut()) {
                    bucket.retain(|o| o.event != id);
                }
            }
        }
    }

    /// Drops every pair of `id` from the calendar's buckets; buckets that
    /// held one are invalidated.
    fn unindex_series(&mut self, calendar: &str, id: &str) {
        let Some(buckets) = self.events.get_mut(calendar) else {
            return;
        };
        for entry in buckets.values_mut() {
            let held = match entry.value.as_mut() {
                Some(bucket) => {
                    let before = bucket.len();
                    bucket.retain(|o| o.event != id);
                    bucket.len() != before
                }
                None => false,
            };
            if held {
                entry.invalidate();
            }
        }
    }

    /// Stores a newly created event and indexes it under the months it
    /// spans. Buckets created here are not fresh.
    pub fn insert_event(&mut self, event: Event) {
        let months = determine_spanned_months(&event);
        let occurrence = Occurrence::new(event.id.clone(), event.date.start);
        let calendar = event.calendar.clone();
        self.templates.insert(event.id.clone(), event);
        self.add_occurrence(&calendar, &months, &occurrence);
    }

    /// Replaces a template and moves its index entries from the months it
    /// used to span to the months it spans now. Returns the previous
    /// template, or `None` if it was not cached (the event is then inserted).
    ///
    /// A recurring series whose date changed cannot be re-expanded locally:
    /// its pairs are dropped and every bucket it touched, before or after,
    /// goes stale so the next read refetches it.
    pub fn update_event(&mut self, event: Event) -> Option<Event> {
        let Some(previous) = self.templates.get(&event.id).cloned() else {
            self.insert_event(event);
            return None;
        };

        if previous.calendar != event.calendar {
            self.remove_event(&previous.id);
            self.insert_event(event);
            return Some(previous);
        }

        if (previous.is_recurring() || event.is_recurring()) && previous.date != event.date {
            let calendar = event.calendar.clone();
            let months = determine_spanned_months(&event);
            self.unindex_series(&calendar, &event.id);
            self.insert_event(event);
            if let Some(buckets) = self.events.get_mut(&calendar) {
                for month in &months {
                    if let Some(entry) = buckets.get_mut(month) {
                        entry.invalidate();
                    }
                }
            }
            return Some(previous);
        }

        let old_months = determine_spanned_months(&previous);
        let new_months = determine_spanned_months(&event);
        let dropped: Vec<MonthKey> = old_months
            .iter()
            .filter(|m| !new_months.contains(m))
            .copied()
            .collect();
        let added: Vec<MonthKey> = new_months
            .iter()
            .filter(|m| !old_months.contains(m))
            .copied()
            .collect();

        let calendar = event.calendar.clone();
        self.remove_id_from_months(&calendar, &dropped, &event.id);

        // Kept months still point at the old start; move them along.
        if previous.date.start != event.date.start {
            if let Some(buckets) = self.events.get_mut(&calendar) {
                for month in old_months.iter().filter(|m| new_months.contains(m)) {
                    if let Some(bucket) = buckets.get_mut(month).and_then(|e| e.value.as_mut()) {
                        for occurrence in bucket.iter_mut() {
                            if occurrence.event == event.id && occurrence.start == previous.date.start {
                                occurrence.start = event.date.start;
                            }
                        }
                        bucket.dedup();
                    }
                }
            }
        }

        let occurrence = Occurrence::new(event.id.clone(), event.date.start);
        self.templates.insert(event.id.clone(), event);
        self.add_occurrence(&calendar, &added, &occurrence);
        Some(previous)
    }

    /// Removes a template and every occurrence pair that refers to it.
    pub fn remove_event(&mut self, id: &str) -> Option<Event> {
        let event = self.templates.remove(id)?;
        if let Some(buckets) = self.events.get_mut(&event.calendar) {
            for entry in buckets.values_mut() {
                if let Some(bucket) = entry.value.as_mut() {
                    bucket.retain(|o| o.event != id);
                }
            }
        }
        Some(event)
    }

    /// Every occurrence pair of visible calendars whose bucket lies inside
    /// `range`, without duplicates, in bucket order.
    pub fn visible_occurrences(
        &self,
        hidden: &HashSet<String>,
        range: Option<&DateRange>,
    ) -> Vec<Occurrence> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut calendars: Vec<&String> = self.events.keys().collect();
        calendars.sort();

        for calendar in calendars.into_iter().filter(|c| !hidden.contains(*c)) {
            let Some(buckets) = self.events.get(calendar) else {
                continue;
            };
            for (month, entry) in buckets {
                if range.is_some_and(|r| !r.contains_month(*month)) {
                    continue;
                }
                for occurrence in entry.value.iter().flatten() {
                    if seen.insert(occurrence.clone()) {
                        result.push(occurrence.clone());
                    }
                }
            }
        }
        result
    }
}
