// file: src/cache/snapshot.rs
//! Persisted layout of the cache. Each map is stored under its own key as a
//! JSON array of `[key, value]` pairs.

use std::collections::{BTreeMap, HashMap};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{Buckets, CacheStore};
use crate::error::AppResult;
use crate::models::{CacheEntry, Calendar, Event, MonthKey, Occurrence, Source};
use crate::recurrence::DisplayZone;

pub const KEY_TIMESTAMP: &str = "cache.timestamp";
pub const KEY_SOURCES: &str = "cache.sources";
pub const KEY_SOURCE_DETAILS: &str = "cache.sourceDetails";
pub const KEY_CALENDARS: &str = "cache.calendars";
pub const KEY_EVENTS: &str = "cache.events";
pub const KEY_EVENTS_MAP: &str = "cache.eventsMap";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub sources: CacheEntry<Vec<Source>>,
    pub source_details: Vec<(String, CacheEntry<Source>)>,
    pub calendars: Vec<(String, CacheEntry<Vec<Calendar>>)>,
    pub events: Vec<(String, Vec<(MonthKey, CacheEntry<Vec<Occurrence>>)>)>,
    pub templates: Vec<(String, Event)>,
}

fn sorted<K: Ord + Clone, V: Clone>(map: &HashMap<K, V>) -> Vec<(K, V)> {
    let mut pairs: Vec<(K, V)> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}

fn decode<T: DeserializeOwned + Default>(entries: &HashMap<String, String>, key: &str) -> AppResult<T> {
    match entries.get(key) {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => Ok(T::default()),
    }
}

impl CacheSnapshot {
    pub fn capture(store: &CacheStore) -> Self {
        let calendars = store
            .calendars
            .iter()
            .map(|(source, entry)| {
                let resolved = CacheEntry {
                    date: entry.date,
                    value: entry.value.as_ref().map(|ids| {
                        ids.iter()
                            .filter_map(|id| store.calendars_by_id.get(id).cloned())
                            .collect()
                    }),
                };
                (source.clone(), resolved)
            })
            .collect::<HashMap<_, _>>();

        let events = store
            .events
            .iter()
            .map(|(calendar, buckets)| {
                let months = buckets.iter().map(|(k, v)| (*k, v.clone())).collect();
                (calendar.clone(), months)
            })
            .collect::<HashMap<_, _>>();

        Self {
            sources: store.sources.clone(),
            source_details: sorted(&store.source_details),
            calendars: sorted(&calendars),
            events: sorted(&events),
            templates: sorted(&store.templates),
        }
    }

    /// Storage rows for every map. The save timestamp is written separately.
    pub fn to_entries(&self) -> AppResult<Vec<(&'static str, String)>> {
        Ok(vec![
            (KEY_SOURCES, serde_json::to_string(&self.sources)?),
            (KEY_SOURCE_DETAILS, serde_json::to_string(&self.source_details)?),
            (KEY_CALENDARS, serde_json::to_string(&self.calendars)?),
            (KEY_EVENTS, serde_json::to_string(&self.events)?),
            (KEY_EVENTS_MAP, serde_json::to_string(&self.templates)?),
        ])
    }

    /// Rebuilds a snapshot from storage rows. Missing rows read as empty.
    pub fn from_entries(entries: &HashMap<String, String>) -> AppResult<Self> {
        Ok(Self {
            sources: decode(entries, KEY_SOURCES)?,
            source_details: decode(entries, KEY_SOURCE_DETAILS)?,
            calendars: decode(entries, KEY_CALENDARS)?,
            events: decode(entries, KEY_EVENTS)?,
            templates: decode(entries, KEY_EVENTS_MAP)?,
        })
    }

    /// Turns the snapshot back into live maps. Calendar id lists and the
    /// calendar-by-id lookup are rebuilt from the stored calendar objects;
    /// all-day templates are pinned to midnight in `zone` again.
    pub fn restore(self, max_age_ms: i64, zone: DisplayZone) -> CacheStore {
        let mut store = CacheStore::new(max_age_ms);
        store.sources = self.sources;
        store.source_details = self.source_details.into_iter().collect();

        for (source, entry) in self.calendars {
            let ids = entry.value.map(|calendars| {
                calendars
                    .into_iter()
                    .map(|calendar| {
                        let id = calendar.id.clone();
                        store.calendars_by_id.insert(id.clone(), calendar);
                        id
                    })
                    .collect::<Vec<_>>()
            });
            store.calendars.insert(source, CacheEntry { date: entry.date, value: ids });
        }

        store.events = self
            .events
            .into_iter()
            .map(|(calendar, months)| (calendar, months.into_iter().collect::<Buckets>()))
            .collect::<HashMap<_, BTreeMap<_, _>>>();

        store.templates = self
            .templates
            .into_iter()
            .map(|(id, mut event)| {
                zone.normalize_all_day(&mut event);
                (id, event)
            })
            .collect();
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::months::DateRange;
    use chrono::{Duration, TimeZone, Utc};

    fn populated() -> CacheStore {
        let mut store = CacheStore::new(600_000);
        store.put_sources(
            50,
            vec![Source {
                id: "s1".into(),
                name: "Work".into(),
                settings: None,
                auth: None,
            }],
        );
        let mut cal = Calendar::new("s1", "Team");
        cal.id = "c1".into();
        store.put_calendars(60, "s1", vec![cal]);

        let start = Utc.with_ymd_and_hms(2024, 5, 6, 9, 30, 0).unwrap();
        let mut event = Event::new("c1", "Planning", start, start + Duration::minutes(45));
        event.id = "e1".into();
        let range = DateRange::new(start, start);
        store.record_fetch(70, "c1", &range, vec![event]);
        store
    }

    #[test]
    fn test_snapshot_rows_use_pair_arrays() {
        let snapshot = CacheSnapshot::capture(&populated());
        let rows: HashMap<&str, String> = snapshot.to_entries().unwrap().into_iter().collect();
        assert!(rows[KEY_CALENDARS].starts_with(r#"[["s1",{"date":60,"value":[{"#));
        assert!(rows[KEY_EVENTS_MAP].starts_with(r#"[["e1",{"#));
        assert!(rows[KEY_EVENTS].contains("2024-05-06T09:30:00Z"));
    }

    #[test]
    fn test_snapshot_restores_equivalent_store() {
        let original = populated();
        let rows: HashMap<String, String> = CacheSnapshot::capture(&original)
            .to_entries()
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        let restored = CacheSnapshot::from_entries(&rows)
            .unwrap()
            .restore(600_000, DisplayZone::Named(chrono_tz::UTC));

        assert_eq!(restored.cached_sources(), original.cached_sources());
        assert_eq!(restored.calendar("c1"), original.calendar("c1"));
        assert_eq!(restored.all_calendar_ids(), vec!["c1".to_string()]);
        assert_eq!(restored.template("e1"), original.template("e1"));
        assert_eq!(restored.buckets("c1"), original.buckets("c1"));
    }

    #[test]
    fn test_missing_rows_restore_empty() {
        let restored = CacheSnapshot::from_entries(&HashMap::new())
            .unwrap()
            .restore(600_000, DisplayZone::Local);
        assert!(restored.cached_sources().is_empty());
        assert!(restored.templates().is_empty());
    }

    #[test]
    fn test_restore_pins_all_day_events() {
        let mut snapshot = CacheSnapshot::capture(&populated());
        snapshot.templates[0].1.date.all_day = true;
        let store = snapshot.restore(600_000, DisplayZone::Named(chrono_tz::UTC));
        let event = store.template("e1").unwrap();
        assert_eq!(event.date.start, Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap());
        assert_eq!(event.date.end, Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap());
    }
}
