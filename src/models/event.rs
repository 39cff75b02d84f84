// file: src/models/event.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Stored event template. One per event id, however many occurrences it has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    pub calendar: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub color: Option<String>,
    pub date: EventDate,
}

/// A template projected onto one concrete occurrence. Same shape as the
/// template; only `date.start`/`date.end` differ.
pub type EventInstance = Event;

/// Always serialized with `end`. The backend may instead send
/// `duration` in nanoseconds, from which `end` is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEventDate")]
pub struct EventDate {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(rename = "allDay", default)]
    pub all_day: bool,
    #[serde(default)]
    pub recurrence: Recurrence,
}

#[derive(Deserialize)]
struct WireEventDate {
    start: DateTime<Utc>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(rename = "allDay", default)]
    all_day: bool,
    #[serde(default)]
    recurrence: Recurrence,
}

impl TryFrom<WireEventDate> for EventDate {
    type Error = String;

    fn try_from(wire: WireEventDate) -> Result<Self, Self::Error> {
        let end = match (wire.end, wire.duration) {
            (Some(end), _) => end,
            (None, Some(nanos)) => wire.start + Duration::nanoseconds(nanos),
            (None, None) => return Err("event date needs `end` or `duration`".to_string()),
        };
        Ok(Self {
            start: wire.start,
            end,
            all_day: wire.all_day,
            recurrence: wire.recurrence,
        })
    }
}

impl Event {
    pub fn new<S: Into<String>>(
        calendar: S,
        name: S,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            calendar: calendar.into(),
            name: name.into(),
            desc: String::new(),
            color: None,
            date: EventDate {
                start,
                end,
                all_day: false,
                recurrence: Recurrence::None,
            },
        }
    }

    pub fn duration(&self) -> Duration {
        self.date.end - self.date.start
    }

    pub fn is_recurring(&self) -> bool {
        !matches!(self.date.recurrence, Recurrence::None)
    }

    /// Inclusive overlap with `[start, end]`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.date.start <= end && self.date.end >= start
    }
}

/// Which event fields an edit touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventChanges {
    pub name: bool,
    pub desc: bool,
    pub color: bool,
    pub date: bool,
}

impl EventChanges {
    pub fn all() -> Self {
        Self {
            name: true,
            desc: true,
            color: true,
            date: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.name || self.desc || self.color || self.date)
    }
}

/// Recurrence descriptor. On the wire this is `false` for single events or
/// an object of RRULE properties (`{"FREQ": "WEEKLY", ...}`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Recurrence {
    #[default]
    None,
    Rule(BTreeMap<String, String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRecurrence {
    Flag(bool),
    Rule(BTreeMap<String, String>),
}

impl Serialize for Recurrence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Recurrence::None => serializer.serialize_bool(false),
            Recurrence::Rule(rule) => rule.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Recurrence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<RawRecurrence>::deserialize(deserializer)? {
            None | Some(RawRecurrence::Flag(_)) => Recurrence::None,
            Some(RawRecurrence::Rule(rule)) if rule.is_empty() => Recurrence::None,
            Some(RawRecurrence::Rule(rule)) => Recurrence::Rule(rule),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_json(recurrence: &str) -> String {
        format!(
            r#"{{"id":"e1","calendar":"c1","name":"Standup","desc":"","color":null,
               "date":{{"start":"2024-03-04T09:00:00Z","end":"2024-03-04T09:15:00Z","allDay":false,"recurrence":{}}}}}"#,
            recurrence
        )
    }

    #[test]
    fn test_single_event_parses() {
        let event: Event = serde_json::from_str(&sample_json("false")).unwrap();
        assert_eq!(event.id, "e1");
        assert!(!event.is_recurring());
        assert_eq!(event.duration(), Duration::minutes(15));
    }

    #[test]
    fn test_recurring_event_parses_rule() {
        let event: Event =
            serde_json::from_str(&sample_json(r#"{"FREQ":"WEEKLY","BYDAY":"MO"}"#)).unwrap();
        match &event.date.recurrence {
            Recurrence::Rule(rule) => assert_eq!(rule.get("FREQ").map(String::as_str), Some("WEEKLY")),
            Recurrence::None => panic!("expected a rule"),
        }
    }

    #[test]
    fn test_null_recurrence_is_none() {
        let event: Event = serde_json::from_str(&sample_json("null")).unwrap();
        assert_eq!(event.date.recurrence, Recurrence::None);
    }

    #[test]
    fn test_duration_form_derives_end() {
        let json = r#"{"id":"e2","calendar":"c1","name":"Lecture",
            "date":{"start":"2024-03-04T09:00:00Z","duration":3600000000000,"allDay":false,"recurrence":false}}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.date.end, Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap());

        let stored = serde_json::to_value(&event).unwrap();
        assert_eq!(stored["date"]["end"], "2024-03-04T10:00:00Z");
    }

    #[test]
    fn test_date_without_end_or_duration_is_rejected() {
        let json = r#"{"calendar":"c1","name":"x","date":{"start":"2024-03-04T09:00:00Z"}}"#;
        assert!(serde_json::from_str::<Event>(json).is_err());
    }

    #[test]
    fn test_recurrence_serializes_false() {
        let value = serde_json::to_value(Recurrence::None).unwrap();
        assert_eq!(value, serde_json::Value::Bool(false));
    }

    #[test]
    fn test_overlaps_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let event = Event::new("c1", "x", end, end + Duration::hours(1));
        assert!(event.overlaps(start, end));
        assert!(!event.overlaps(start, end - Duration::seconds(1)));
    }
}
