// file: src/models/calendar.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub overridden: bool,
}

impl Calendar {
    pub fn new<S: Into<String>>(source: S, name: S) -> Self {
        Self {
            id: String::new(),
            source: source.into(),
            name: name.into(),
            desc: String::new(),
            color: None,
            overridden: false,
        }
    }
}

/// Which calendar fields an edit touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalendarChanges {
    pub name: bool,
    pub desc: bool,
    pub color: bool,
}

impl CalendarChanges {
    pub fn all() -> Self {
        Self {
            name: true,
            desc: true,
            color: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.name || self.desc || self.color)
    }
}
