// Declare modules
pub mod cache;
pub mod calendar;
pub mod event;
pub mod source;
pub mod sync;

// Re-export all public types so callers can use `crate::models::Event` directly.
pub use cache::{CacheEntry, MonthKey, Occurrence};
pub use calendar::{Calendar, CalendarChanges};
pub use event::{Event, EventChanges, EventDate, EventInstance, Recurrence};
pub use source::{AuthMethod, IcalLocation, Source, SourceChanges, SourceSettings};
pub use sync::{FetchFailure, FetchOutcome, FetchTarget, MoveOutcome, Warning};
