// file: src/recurrence.rs
//! Projection of stored templates onto concrete occurrences, plus the
//! display-zone arithmetic all-day events need.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{AppError, AppResult};
use crate::models::{Event, EventInstance, Occurrence};

/// Zone in which all-day events are pinned to midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayZone {
    #[default]
    Local,
    Named(Tz),
}

impl FromStr for DisplayZone {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim() {
            "" | "local" | "Local" => Ok(DisplayZone::Local),
            name => name
                .parse::<Tz>()
                .map(DisplayZone::Named)
                .map_err(|_| AppError::config(format!("Unknown time zone '{}'", name))),
        }
    }
}

impl DisplayZone {
    /// Calendar date of `at` as seen in this zone.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        match self {
            DisplayZone::Local => at.with_timezone(&Local).date_naive(),
            DisplayZone::Named(tz) => at.with_timezone(tz).date_naive(),
        }
    }

    /// `date` at `time` in this zone, as a UTC instant. Nonexistent local
    /// times (spring-forward gaps) fall back to the UTC reading.
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let naive = date.and_time(time);
        let resolved = match self {
            DisplayZone::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            DisplayZone::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        };
        resolved.unwrap_or_else(|| naive.and_utc())
    }

    /// Local midnight of the day containing `at`.
    pub fn start_of_day(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        self.at(self.local_date(at), NaiveTime::MIN)
    }

    /// Last millisecond of the local day containing `at`.
    pub fn end_of_day(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
        self.at(self.local_date(at), last)
    }

    /// Pins both ends of an all-day event to local midnight. Timed events
    /// are left alone.
    pub fn normalize_all_day(&self, event: &mut Event) {
        if event.date.all_day {
            event.date.start = self.start_of_day(event.date.start);
            event.date.end = self.start_of_day(event.date.end);
        }
    }

    /// The local calendar date of `at` re-expressed as UTC midnight. All-day
    /// dates travel to the server in this form.
    pub fn date_as_utc_midnight(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        self.local_date(at).and_time(NaiveTime::MIN).and_utc()
    }
}

/// Expands one occurrence pair into a displayable instance. Returns `None`
/// when the template is not cached.
pub fn project(
    templates: &HashMap<String, Event>,
    occurrence: &Occurrence,
    zone: DisplayZone,
) -> Option<EventInstance> {
    let template = templates.get(&occurrence.event)?;
    let mut instance = template.clone();
    instance.date.start = occurrence.start;
    instance.date.end = occurrence.start + template.duration();
    zone.normalize_all_day(&mut instance);
    Some(instance)
}
