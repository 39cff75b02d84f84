// file: src/tracker.rs
//! Reference-counted "currently loading" and "faulty" bookkeeping for
//! sources and calendars.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

/// Point-in-time view of the tracker, as published to observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadingSnapshot {
    pub loading: bool,
    pub loading_sources: HashSet<String>,
    pub loading_calendars: HashSet<String>,
    pub faulty_sources: HashMap<String, String>,
    pub faulty_calendars: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct TrackerState {
    in_flight: usize,
    sources: HashMap<String, usize>,
    calendars: HashMap<String, usize>,
    faulty_sources: HashMap<String, String>,
    faulty_calendars: HashMap<String, String>,
}

impl TrackerState {
    fn snapshot(&self) -> LoadingSnapshot {
        LoadingSnapshot {
            loading: self.in_flight > 0,
            loading_sources: self.sources.keys().cloned().collect(),
            loading_calendars: self.calendars.keys().cloned().collect(),
            faulty_sources: self.faulty_sources.clone(),
            faulty_calendars: self.faulty_calendars.clone(),
        }
    }
}

fn decrement(counts: &mut HashMap<String, usize>, id: &str) {
    if let Some(count) = counts.get_mut(id) {
        *count -= 1;
        if *count == 0 {
            counts.remove(id);
        }
    }
}

#[derive(Debug, Clone)]
enum Scope {
    Global,
    Source(String),
    Calendar(String),
}

struct Inner {
    state: Mutex<TrackerState>,
    tx: watch::Sender<LoadingSnapshot>,
}

#[derive(Clone)]
pub struct LoadingTracker {
    inner: Arc<Inner>,
}

impl Default for LoadingTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LoadingSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(TrackerState::default()),
                tx,
            }),
        }
    }

    fn update<R>(&self, f: impl FnOnce(&mut TrackerState) -> R) -> R {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        let result = f(&mut state);
        self.inner.tx.send_replace(state.snapshot());
        result
    }

    fn start(&self, scope: Scope) -> LoadingHandle {
        self.update(|state| {
            state.in_flight += 1;
            match &scope {
                Scope::Global => {}
                Scope::Source(id) => *state.sources.entry(id.clone()).or_insert(0) += 1,
                Scope::Calendar(id) => *state.calendars.entry(id.clone()).or_insert(0) += 1,
            }
        });
        LoadingHandle {
            tracker: self.clone(),
            scope,
            released: AtomicBool::new(false),
        }
    }

    fn finish(&self, scope: &Scope) {
        self.update(|state| {
            state.in_flight = state.in_flight.saturating_sub(1);
            match scope {
                Scope::Global => {}
                Scope::Source(id) => decrement(&mut state.sources, id),
                Scope::Calendar(id) => decrement(&mut state.calendars, id),
            }
        });
    }

    /// Marks unattributed work as in flight.
    pub fn start_loading(&self) -> LoadingHandle {
        self.start(Scope::Global)
    }

    pub fn start_loading_source(&self, id: &str) -> LoadingHandle {
        self.start(Scope::Source(id.to_string()))
    }

    pub fn start_loading_calendar(&self, id: &str) -> LoadingHandle {
        self.start(Scope::Calendar(id.to_string()))
    }

    pub fn add_faulty_source(&self, id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(|state| state.faulty_sources.insert(id.to_string(), reason));
    }

    pub fn remove_faulty_source(&self, id: &str) {
        self.update(|state| state.faulty_sources.remove(id));
    }

    pub fn add_faulty_calendar(&self, id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(|state| state.faulty_calendars.insert(id.to_string(), reason));
    }

    pub fn remove_faulty_calendar(&self, id: &str) {
        self.update(|state| state.faulty_calendars.remove(id));
    }

    pub fn is_loading(&self) -> bool {
        self.inner.tx.borrow().loading
    }

    pub fn is_source_loading(&self, id: &str) -> bool {
        self.inner.tx.borrow().loading_sources.contains(id)
    }

    pub fn is_calendar_loading(&self, id: &str) -> bool {
        self.inner.tx.borrow().loading_calendars.contains(id)
    }

    pub fn source_fault(&self, id: &str) -> Option<String> {
        self.inner.tx.borrow().faulty_sources.get(id).cloned()
    }

    pub fn calendar_fault(&self, id: &str) -> Option<String> {
        self.inner.tx.borrow().faulty_calendars.get(id).cloned()
    }

    pub fn snapshot(&self) -> LoadingSnapshot {
        self.inner.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadingSnapshot> {
        self.inner.tx.subscribe()
    }
}

/// Releases its loading mark when dropped. `release` may be called any
/// number of times; only the first call counts.
pub struct LoadingHandle {
    tracker: LoadingTracker,
    scope: Scope,
    released: AtomicBool,
}

impl LoadingHandle {
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.tracker.finish(&self.scope);
        }
    }
}

impl Drop for LoadingHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for LoadingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingHandle")
            .field("scope", &self.scope)
            .field("released", &self.released.load(Ordering::SeqCst))
            .finish()
    }
}
