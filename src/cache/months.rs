//! Month-bucket arithmetic. Buckets are keyed by the UTC timestamp of the
//! first instant of a month.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};

use crate::models::{Event, MonthKey};

/// First instant of the UTC month containing `at`.
pub fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(at)
}

pub fn month_key(at: DateTime<Utc>) -> MonthKey {
    month_start(at).timestamp_millis()
}

pub fn key_to_datetime(key: MonthKey) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(key).single().unwrap_or_default()
}

/// Shifts a month start by `delta` months (negative moves backwards).
pub fn add_months(month: DateTime<Utc>, delta: i32) -> DateTime<Utc> {
    let date = NaiveDate::from_ymd_opt(month.year(), month.month(), 1).unwrap_or_default();
    let shifted = if delta >= 0 {
        date.checked_add_months(Months::new(delta as u32))
    } else {
        date.checked_sub_months(Months::new(delta.unsigned_abs()))
    };
    shifted.unwrap_or(date).and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Month keys spanned by `[start, end)`: the start's month, then every
/// following month whose first instant is still before `end`.
pub fn spanned_months(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<MonthKey> {
    let mut cursor = month_start(start);
    let mut months = vec![cursor.timestamp_millis()];
    loop {
        cursor = add_months(cursor, 1);
        if cursor >= end {
            break;
        }
        months.push(cursor.timestamp_millis());
    }
    months
}

/// Months spanned by an event template's own date range.
pub fn determine_spanned_months(event: &Event) -> Vec<MonthKey> {
    spanned_months(event.date.start, event.date.end)
}

/// Months spanned by one occurrence of `template` starting at `start`.
pub fn occurrence_months(template: &Event, start: DateTime<Utc>) -> Vec<MonthKey> {
    spanned_months(start, start + template.duration())
}

/// An inclusive time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whole months from the start's month to the end's month, plus one
    /// month of padding on each side. The end is the last millisecond of
    /// the padded end month.
    pub fn widened(&self) -> DateRange {
        let start = add_months(month_start(self.start), -1);
        let end = add_months(month_start(self.end), 2) - Duration::milliseconds(1);
        DateRange { start, end }
    }

    pub fn first_month(&self) -> MonthKey {
        month_key(self.start)
    }

    pub fn last_month(&self) -> MonthKey {
        month_key(self.end)
    }

    /// Every month key touched by the range, in order.
    pub fn months(&self) -> Vec<MonthKey> {
        let mut months = Vec::new();
        let mut cursor = month_start(self.start);
        while cursor <= self.end {
            months.push(cursor.timestamp_millis());
            cursor = add_months(cursor, 1);
        }
        months
    }

    pub fn contains_month(&self, key: MonthKey) -> bool {
        key >= self.first_month() && key <= self.end.timestamp_millis()
    }
}
