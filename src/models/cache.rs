// file: src/models/cache.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds since the epoch of the first instant of a UTC month.
pub type MonthKey = i64;

/// A timestamped cache slot. `date` is the wall-clock write time in
/// milliseconds; zero means "never fetched or invalidated".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub date: i64,
    pub value: Option<T>,
}

impl<T> CacheEntry<T> {
    pub fn empty() -> Self {
        Self {
            date: 0,
            value: None,
        }
    }

    pub fn new(date: i64, value: T) -> Self {
        Self {
            date,
            value: Some(value),
        }
    }

    /// A value the caller may keep but must not trust.
    pub fn stale(value: T) -> Self {
        Self {
            date: 0,
            value: Some(value),
        }
    }

    /// A zero `date` is never fresh, whatever the clock says.
    pub fn is_fresh(&self, now_ms: i64, max_age_ms: i64) -> bool {
        self.date > 0 && now_ms - self.date < max_age_ms
    }

    /// The value if it is still fresh; `None` means "must refetch".
    pub fn fresh(&self, now_ms: i64, max_age_ms: i64) -> Option<&T> {
        if self.is_fresh(now_ms, max_age_ms) {
            self.value.as_ref()
        } else {
            None
        }
    }

    pub fn invalidate(&mut self) {
        self.date = 0;
    }
}

impl<T> Default for CacheEntry<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// One occurrence of a stored template, as recorded in a month bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    pub event: String,
    pub start: DateTime<Utc>,
}

impl Occurrence {
    pub fn new<S: Into<String>>(event: S, start: DateTime<Utc>) -> Self {
        Self {
            event: event.into(),
            start,
        }
    }
}
