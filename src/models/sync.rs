// file: src/models/sync.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Event;

/// What kind of entity a fan-out member was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchTarget {
    Source,
    Calendar,
}

impl FetchTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchTarget::Source => "source",
            FetchTarget::Calendar => "calendar",
        }
    }
}

/// A single failed member of a fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub target: FetchTarget,
    pub id: String,
    pub name: Option<String>,
    pub message: String,
}

impl FetchFailure {
    pub fn new(target: FetchTarget, id: &str, name: Option<&str>, message: String) -> Self {
        Self {
            target,
            id: id.to_string(),
            name: name.map(str::to_string),
            message,
        }
    }

    /// Text suitable for a per-item warning in the UI.
    pub fn describe(&self, action: &str) -> String {
        match &self.name {
            Some(name) => format!("Failed to {} from {}: {}", action, name, self.message),
            None => format!(
                "Failed to {} from {} {}: {}",
                action,
                self.target.as_str(),
                self.id,
                self.message
            ),
        }
    }
}

/// Result of an at-least-one-success fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome<T> {
    pub items: T,
    pub failures: Vec<FetchFailure>,
}

impl<T> FetchOutcome<T> {
    pub fn complete(items: T) -> Self {
        Self {
            items,
            failures: Vec::new(),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// A user-visible warning emitted by background work.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub message: String,
    pub failure: Option<FetchFailure>,
    pub at: DateTime<Utc>,
}

/// End state of a move (create-then-delete).
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    /// The copy exists in the target calendar and the original is gone.
    Moved(Event),
    /// Deleting the original failed; the copy was removed again, so the
    /// event is back where it started.
    RolledBack { original: Event, error: String },
    /// Deleting the original failed and removing the copy failed too; the
    /// event now exists in both calendars.
    Duplicated {
        original: Event,
        copy: Event,
        error: String,
    },
}

impl MoveOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, MoveOutcome::Moved(_))
    }
}
