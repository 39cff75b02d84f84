// file: src/repository/mod.rs
//! The sync context: one `Repository` per session, cheap to clone, owning
//! the cache, the derived views and every background worker.

pub mod fetch;
pub mod mutations;
pub mod storage;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use log::{info, warn};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, RemoteApi};
use crate::cache::{CacheSnapshot, CacheStore, DateRange};
use crate::compile::{self, Debouncer, Job, Views};
use crate::config::{validate_config, Config};
use crate::database::{Database, Persistence, StoredState};
use crate::error::{AppError, AppResult};
use crate::models::{Calendar, EventInstance, FetchFailure, Occurrence, Source, Warning};
use crate::recurrence::{project, DisplayZone};
use crate::tracker::{LoadingSnapshot, LoadingTracker};
use crate::utils::clock::{Clock, SystemClock};
use crate::visibility::Visibility;

const WARNING_CAPACITY: usize = 64;

/// State read by the compile jobs. Locks are never held across an await.
pub(crate) struct State {
    cache: Mutex<CacheStore>,
    visibility: Mutex<Visibility>,
    range: Mutex<Option<DateRange>>,
    views: Views,
    zone: DisplayZone,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl State {
    fn new(max_age_ms: i64, zone: DisplayZone) -> Self {
        Self {
            cache: Mutex::new(CacheStore::new(max_age_ms)),
            visibility: Mutex::new(Visibility::default()),
            range: Mutex::new(None),
            views: Views::new(),
            zone,
        }
    }

    pub(crate) fn cache(&self) -> MutexGuard<'_, CacheStore> {
        lock(&self.cache)
    }

    pub(crate) fn visibility(&self) -> MutexGuard<'_, Visibility> {
        lock(&self.visibility)
    }

    pub(crate) fn active_range(&self) -> Option<DateRange> {
        *lock(&self.range)
    }

    fn set_active_range(&self, range: DateRange) {
        *lock(&self.range) = Some(range);
    }

    fn restore(&self, stored: StoredState) {
        let max_age = self.cache().max_age_ms();
        let store = stored.snapshot.restore(max_age, self.zone);
        *self.cache() = store;
        *self.visibility() = stored.visibility;
    }

    fn compile_sources(&self) {
        let sources = compile::compile_sources(&self.cache());
        self.views.sources.send_replace(sources);
    }

    fn compile_calendars(&self) {
        let calendars = compile::compile_calendars(&self.cache());
        self.views.calendars.send_replace(calendars);
    }

    fn compile_events(&self) {
        let hidden = self.visibility().hidden_calendars().clone();
        let range = self.active_range();
        let events = compile::compile_events(&self.cache(), &hidden, range.as_ref(), self.zone);
        self.views.events.send_replace(events);
    }

    fn compile_all(&self) {
        self.compile_sources();
        self.compile_calendars();
        self.compile_events();
    }
}

fn compile_job(state: &Arc<State>, run: fn(&State)) -> Job {
    let state = state.clone();
    Arc::new(move || {
        run(&state);
        futures::future::ready(()).boxed()
    })
}

fn save_job(state: &Arc<State>, persistence: &Arc<Persistence>, clock: &Arc<dyn Clock>) -> Job {
    let (state, persistence, clock) = (state.clone(), persistence.clone(), clock.clone());
    Arc::new(move || {
        let snapshot = CacheSnapshot::capture(&state.cache());
        let visibility = state.visibility().clone();
        let persistence = persistence.clone();
        let now = clock.now_ms();
        async move {
            if let Err(e) = persistence.save(&snapshot, &visibility, now).await {
                log::error!("[Storage] Failed to save cache: {}", e);
            }
        }
        .boxed()
    })
}

type FetchKey = (String, i64, i64);
type SharedFetch = Shared<BoxFuture<'static, Result<Vec<EventInstance>, Arc<AppError>>>>;

struct Jobs {
    sources: Debouncer,
    calendars: Debouncer,
    events: Debouncer,
    save: Debouncer,
}

pub(crate) struct Inner {
    api: Arc<dyn RemoteApi>,
    clock: Arc<dyn Clock>,
    tracker: LoadingTracker,
    persistence: Arc<Persistence>,
    state: Arc<State>,
    jobs: Jobs,
    in_flight: Mutex<HashMap<FetchKey, SharedFetch>>,
    warnings: broadcast::Sender<Warning>,
    cancel: CancellationToken,
    poller: Mutex<Option<JoinHandle<()>>>,
}

/// Client-side cache and sync engine for sources, calendars and events.
#[derive(Clone)]
pub struct Repository {
    inner: Arc<Inner>,
}

impl Repository {
    /// Production wiring: HTTP client, SQLite file at `config.db_path`,
    /// system clock.
    pub async fn open(config: Config) -> AppResult<Self> {
        let api: Arc<dyn RemoteApi> = Arc::new(ApiClient::new(&config)?);
        let db = Database::open(&config.db_path).await?;
        Self::connect(config, api, db, Arc::new(SystemClock)).await
    }

    /// Builds a repository over explicit collaborators and loads whatever
    /// state `db` holds before returning.
    pub async fn connect(
        config: Config,
        api: Arc<dyn RemoteApi>,
        db: Database,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        validate_config(&config)?;

        let persistence = Arc::new(Persistence::new(db));
        let state = Arc::new(State::new(config.max_cache_age_ms(), config.zone));
        match persistence.load_if_changed().await {
            Ok(Some(stored)) => {
                info!("[Repository] Restored cache saved at {}", stored.timestamp);
                state.restore(stored);
            }
            Ok(None) => {}
            Err(AppError::Serialization(e)) => {
                warn!("[Repository] Stored cache is unreadable, starting empty: {}", e);
                persistence.database().clear().await?;
            }
            Err(e) => return Err(e),
        }
        state.compile_all();

        let cancel = CancellationToken::new();
        let jobs = Jobs {
            sources: Debouncer::spawn(
                "sources",
                config.compile_delay,
                cancel.child_token(),
                compile_job(&state, State::compile_sources),
            ),
            calendars: Debouncer::spawn(
                "calendars",
                config.compile_delay,
                cancel.child_token(),
                compile_job(&state, State::compile_calendars),
            ),
            events: Debouncer::spawn(
                "events",
                config.compile_delay,
                cancel.child_token(),
                compile_job(&state, State::compile_events),
            ),
            save: Debouncer::spawn(
                "save",
                config.save_delay,
                cancel.child_token(),
                save_job(&state, &persistence, &clock),
            ),
        };

        let (warnings, _) = broadcast::channel(WARNING_CAPACITY);
        let repo = Repository {
            inner: Arc::new(Inner {
                api,
                clock,
                tracker: LoadingTracker::new(),
                persistence,
                state,
                jobs,
                in_flight: Mutex::new(HashMap::new()),
                warnings,
                cancel,
                poller: Mutex::new(None),
            }),
        };

        if let Some(interval) = config.storage_poll {
            repo.start_storage_poller(interval);
        }

        info!("[Repository] Ready (api: {})", config.api_url);
        Ok(repo)
    }

    fn now_ms(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    pub(crate) fn state(&self) -> &State {
        &self.inner.state
    }

    pub fn tracker(&self) -> &LoadingTracker {
        &self.inner.tracker
    }

    pub fn zone(&self) -> DisplayZone {
        self.inner.state.zone
    }

    // --- Scheduling ---

    fn schedule_sources(&self) {
        self.inner.jobs.sources.schedule();
    }

    fn schedule_calendars(&self) {
        self.inner.jobs.calendars.schedule();
    }

    fn schedule_events(&self) {
        self.inner.jobs.events.schedule();
    }

    fn schedule_all(&self) {
        self.schedule_sources();
        self.schedule_calendars();
        self.schedule_events();
    }

    fn schedule_save(&self) {
        self.inner.jobs.save.schedule();
    }

    /// Runs `task` in the background until it finishes or the repository
    /// shuts down.
    fn spawn_background<F>(&self, what: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.inner.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => log::debug!("[Repository] {} abandoned on shutdown", what),
                _ = task => {}
            }
        });
    }

    // --- Warnings ---

    fn warn(&self, message: String, failure: Option<FetchFailure>) {
        warn!("[Repository] {}", message);
        let warning = Warning {
            message,
            failure,
            at: self.inner.clock.now(),
        };
        // No subscribers is fine.
        let _ = self.inner.warnings.send(warning);
    }

    pub fn subscribe_warnings(&self) -> broadcast::Receiver<Warning> {
        self.inner.warnings.subscribe()
    }

    // --- Views ---

    pub fn subscribe_sources(&self) -> watch::Receiver<Vec<Source>> {
        self.inner.state.views.sources.subscribe()
    }

    pub fn subscribe_calendars(&self) -> watch::Receiver<Vec<Calendar>> {
        self.inner.state.views.calendars.subscribe()
    }

    pub fn subscribe_events(&self) -> watch::Receiver<Vec<EventInstance>> {
        self.inner.state.views.events.subscribe()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<LoadingSnapshot> {
        self.inner.tracker.subscribe()
    }

    /// Last compiled source list.
    pub fn sources(&self) -> Vec<Source> {
        self.inner.state.views.sources.borrow().clone()
    }

    /// Last compiled calendar list.
    pub fn calendars(&self) -> Vec<Calendar> {
        self.inner.state.views.calendars.borrow().clone()
    }

    /// Last compiled events of visible calendars in the active range.
    pub fn events(&self) -> Vec<EventInstance> {
        self.inner.state.views.events.borrow().clone()
    }

    pub fn active_range(&self) -> Option<DateRange> {
        self.inner.state.active_range()
    }

    // --- Visibility ---

    pub fn is_calendar_visible(&self, id: &str) -> bool {
        self.inner.state.visibility().is_calendar_visible(id)
    }

    pub fn hidden_calendars(&self) -> HashSet<String> {
        self.inner.state.visibility().hidden_calendars().clone()
    }

    /// Hides or shows a calendar. Showing it fetches its events for the
    /// active range; a failure there becomes a warning.
    pub async fn set_calendar_visibility(&self, id: &str, visible: bool) {
        let changed = self.inner.state.visibility().set_calendar_visible(id, visible);
        if !changed {
            return;
        }
        info!("[Repository] Calendar {} {}", id, if visible { "shown" } else { "hidden" });
        self.schedule_events();
        self.schedule_save();

        if !visible {
            return;
        }
        if let Some(range) = self.active_range() {
            if let Err(e) = self.get_events_from_calendar(id, range.start, range.end, false).await {
                let name = self.inner.state.cache().calendar(id).map(|c| c.name.clone());
                self.warn(
                    format!(
                        "Failed to fetch events from {}: {}",
                        name.as_deref().unwrap_or(id),
                        e.to_safe_string()
                    ),
                    None,
                );
            }
        }
    }

    pub fn is_source_collapsed(&self, id: &str) -> bool {
        self.inner.state.visibility().is_source_collapsed(id)
    }

    pub fn set_source_collapsed(&self, id: &str, collapsed: bool) {
        if self.inner.state.visibility().set_source_collapsed(id, collapsed) {
            self.schedule_save();
        }
    }

    // --- Projection helpers ---

    /// Projects occurrence pairs, dropping duplicates and unresolvable
    /// templates, ordered by start.
    fn project_all(&self, occurrences: &[Occurrence]) -> Vec<EventInstance> {
        let zone = self.zone();
        let cache = self.inner.state.cache();
        let mut seen = HashSet::new();
        let mut events: Vec<EventInstance> = occurrences
            .iter()
            .filter(|o| seen.insert((*o).clone()))
            .filter_map(|o| project(cache.templates(), o, zone))
            .collect();
        events.sort_by(|a, b| a.date.start.cmp(&b.date.start).then_with(|| a.id.cmp(&b.id)));
        events
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }
}
