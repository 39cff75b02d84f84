// file: src/visibility.rs
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::AppResult;

pub const KEY_HIDDEN_CALENDARS: &str = "hiddenCalendars";
pub const KEY_COLLAPSED_SOURCES: &str = "collapsedSources";

/// User-controlled display state: hidden calendars are neither fetched nor
/// compiled; collapsed sources are only remembered for the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visibility {
    hidden_calendars: HashSet<String>,
    collapsed_sources: HashSet<String>,
}

fn encode(set: &HashSet<String>) -> AppResult<String> {
    let ordered: BTreeSet<&String> = set.iter().collect();
    Ok(serde_json::to_string(&ordered)?)
}

fn decode(entries: &HashMap<String, String>, key: &str) -> AppResult<HashSet<String>> {
    match entries.get(key) {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => Ok(HashSet::new()),
    }
}

impl Visibility {
    pub fn is_calendar_visible(&self, id: &str) -> bool {
        !self.hidden_calendars.contains(id)
    }

    /// Returns whether anything changed.
    pub fn set_calendar_visible(&mut self, id: &str, visible: bool) -> bool {
        if visible {
            self.hidden_calendars.remove(id)
        } else {
            self.hidden_calendars.insert(id.to_string())
        }
    }

    pub fn hidden_calendars(&self) -> &HashSet<String> {
        &self.hidden_calendars
    }

    pub fn is_source_collapsed(&self, id: &str) -> bool {
        self.collapsed_sources.contains(id)
    }

    pub fn set_source_collapsed(&mut self, id: &str, collapsed: bool) -> bool {
        if collapsed {
            self.collapsed_sources.insert(id.to_string())
        } else {
            self.collapsed_sources.remove(id)
        }
    }

    /// Drops entries for calendars and sources that no longer exist.
    pub fn forget(&mut self, sources: &[String], calendars: &[String]) {
        for id in sources {
            self.collapsed_sources.remove(id);
        }
        for id in calendars {
            self.hidden_calendars.remove(id);
        }
    }

    pub fn to_entries(&self) -> AppResult<Vec<(&'static str, String)>> {
        Ok(vec![
            (KEY_HIDDEN_CALENDARS, encode(&self.hidden_calendars)?),
            (KEY_COLLAPSED_SOURCES, encode(&self.collapsed_sources)?),
        ])
    }

    pub fn from_entries(entries: &HashMap<String, String>) -> AppResult<Self> {
        Ok(Self {
            hidden_calendars: decode(entries, KEY_HIDDEN_CALENDARS)?,
            collapsed_sources: decode(entries, KEY_COLLAPSED_SOURCES)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_reports_change() {
        let mut visibility = Visibility::default();
        assert!(visibility.is_calendar_visible("c1"));
        assert!(visibility.set_calendar_visible("c1", false));
        assert!(!visibility.set_calendar_visible("c1", false));
        assert!(!visibility.is_calendar_visible("c1"));
        assert!(visibility.set_calendar_visible("c1", true));
    }

    #[test]
    fn test_entries_are_sorted_arrays() {
        let mut visibility = Visibility::default();
        visibility.set_calendar_visible("b", false);
        visibility.set_calendar_visible("a", false);
        visibility.set_source_collapsed("s1", true);
        let rows: HashMap<String, String> = visibility
            .to_entries()
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(rows[KEY_HIDDEN_CALENDARS], r#"["a","b"]"#);
        assert_eq!(Visibility::from_entries(&rows).unwrap(), visibility);
    }

    #[test]
    fn test_forget_removes_stale_ids() {
        let mut visibility = Visibility::default();
        visibility.set_calendar_visible("c1", false);
        visibility.set_source_collapsed("s1", true);
        visibility.forget(&["s1".to_string()], &["c1".to_string()]);
        assert_eq!(visibility, Visibility::default());
    }
}
