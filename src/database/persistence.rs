// file: src/database/persistence.rs
//! Whole-cache saves tagged with a save timestamp, and loads that skip
//! state this instance wrote itself.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use super::Database;
use crate::cache::snapshot::KEY_TIMESTAMP;
use crate::cache::CacheSnapshot;
use crate::error::AppResult;
use crate::utils::logging::log_persistence;
use crate::visibility::Visibility;

/// Everything read back from storage in one load.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredState {
    pub timestamp: i64,
    pub snapshot: CacheSnapshot,
    pub visibility: Visibility,
}

pub struct Persistence {
    db: Database,
    last_save: AtomicI64,
}

impl Persistence {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            last_save: AtomicI64::new(0),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Timestamp of the last state this instance wrote or loaded.
    pub fn last_save(&self) -> i64 {
        self.last_save.load(Ordering::SeqCst)
    }

    /// Writes the full snapshot and the visibility sets. The save
    /// timestamp is strictly greater than any this instance has seen.
    pub async fn save(
        &self,
        snapshot: &CacheSnapshot,
        visibility: &Visibility,
        now_ms: i64,
    ) -> AppResult<i64> {
        let started = Instant::now();
        let timestamp = now_ms.max(self.last_save() + 1);

        let mut rows = snapshot.to_entries()?;
        rows.extend(visibility.to_entries()?);
        rows.push((KEY_TIMESTAMP, timestamp.to_string()));

        self.db.set_entries(&rows).await?;
        self.last_save.store(timestamp, Ordering::SeqCst);

        log_persistence("Saved", timestamp, started.elapsed().as_millis() as u64);
        Ok(timestamp)
    }

    /// Reads stored state unless its save timestamp is the one this
    /// instance already holds.
    pub async fn load_if_changed(&self) -> AppResult<Option<StoredState>> {
        let started = Instant::now();
        let stored = self
            .db
            .get_entry(KEY_TIMESTAMP)
            .await?
            .and_then(|raw| raw.trim().parse::<i64>().ok());

        if stored.is_some_and(|ts| ts == self.last_save()) {
            log::debug!("[Storage] Snapshot unchanged, skipping reload");
            return Ok(None);
        }

        let rows = self.db.get_entries().await?;
        let snapshot = CacheSnapshot::from_entries(&rows)?;
        let visibility = Visibility::from_entries(&rows)?;

        let timestamp = stored.unwrap_or(0);
        self.last_save.store(timestamp, Ordering::SeqCst);

        log_persistence("Loaded", timestamp, started.elapsed().as_millis() as u64);
        Ok(Some(StoredState {
            timestamp,
            snapshot,
            visibility,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use crate::cache::CacheStore;

    fn snapshot_with_source(name: &str) -> CacheSnapshot {
        let mut store = CacheStore::new(600_000);
        store.put_sources(
            1,
            vec![Source {
                id: "s1".into(),
                name: name.into(),
                settings: None,
                auth: None,
            }],
        );
        CacheSnapshot::capture(&store)
    }

    #[tokio::test]
    async fn test_own_save_is_not_reloaded() {
        let persistence = Persistence::new(Database::in_memory().await.unwrap());
        persistence
            .save(&snapshot_with_source("Work"), &Visibility::default(), 1_000)
            .await
            .unwrap();
        assert!(persistence.load_if_changed().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_timestamps_are_monotonic() {
        let persistence = Persistence::new(Database::in_memory().await.unwrap());
        let snapshot = snapshot_with_source("Work");
        let first = persistence.save(&snapshot, &Visibility::default(), 5_000).await.unwrap();
        let second = persistence.save(&snapshot, &Visibility::default(), 5_000).await.unwrap();
        let third = persistence.save(&snapshot, &Visibility::default(), 4_000).await.unwrap();
        assert_eq!(first, 5_000);
        assert_eq!(second, 5_001);
        assert_eq!(third, 5_002);
    }

    #[tokio::test]
    async fn test_foreign_save_is_loaded_once() {
        let db = Database::in_memory().await.unwrap();
        let writer = Persistence::new(db.clone());
        let reader = Persistence::new(db);

        let mut visibility = Visibility::default();
        visibility.set_calendar_visible("c9", false);
        writer.save(&snapshot_with_source("Home"), &visibility, 42).await.unwrap();

        let state = reader.load_if_changed().await.unwrap().unwrap();
        assert_eq!(state.timestamp, 42);
        assert_eq!(state.visibility, visibility);
        assert_eq!(state.snapshot.sources.value.unwrap()[0].name, "Home");

        assert!(reader.load_if_changed().await.unwrap().is_none());
        assert_eq!(reader.last_save(), 42);
    }

    #[tokio::test]
    async fn test_empty_storage_loads_defaults() {
        let persistence = Persistence::new(Database::in_memory().await.unwrap());
        let state = persistence.load_if_changed().await.unwrap().unwrap();
        assert_eq!(state.timestamp, 0);
        assert!(state.visibility.hidden_calendars().is_empty());
        assert!(state.snapshot.templates.is_empty());
    }
}
