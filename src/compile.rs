// file: src/compile.rs
//! Derived, UI-facing collections and the coalescing scheduler that
//! recomputes them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheStore, DateRange};
use crate::models::{Calendar, EventInstance, Source};
use crate::recurrence::{project, DisplayZone};

pub type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct DebouncerInner {
    notify: Notify,
    pending: AtomicBool,
    running: AsyncMutex<()>,
    job: Job,
}

impl DebouncerInner {
    async fn run_if_pending(&self) {
        let _running = self.running.lock().await;
        if self.pending.swap(false, Ordering::SeqCst) {
            (self.job)().await;
        }
    }
}

/// Runs `job` once after `quiet` has passed with no further `schedule`
/// calls. Every call re-arms the timer, so a burst of calls costs one run.
pub struct Debouncer {
    inner: Arc<DebouncerInner>,
    task: JoinHandle<()>,
}

impl Debouncer {
    pub fn spawn(name: &'static str, quiet: Duration, cancel: CancellationToken, job: Job) -> Self {
        let inner = Arc::new(DebouncerInner {
            notify: Notify::new(),
            pending: AtomicBool::new(false),
            running: AsyncMutex::new(()),
            job,
        });

        let worker = inner.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = worker.notify.notified() => {}
                }

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            worker.run_if_pending().await;
                            log::debug!("[Compile] {} debouncer stopped", name);
                            return;
                        }
                        _ = worker.notify.notified() => continue,
                        _ = tokio::time::sleep(quiet) => break,
                    }
                }

                worker.run_if_pending().await;
            }
            log::debug!("[Compile] {} debouncer stopped", name);
        });

        Self { inner, task }
    }

    pub fn schedule(&self) {
        self.inner.pending.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Runs a pending job now instead of waiting for the quiet period, or
    /// waits for a run that is already under way.
    pub async fn flush(&self) {
        self.inner.run_if_pending().await;
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch channels carrying the three derived collections.
pub struct Views {
    pub sources: watch::Sender<Vec<Source>>,
    pub calendars: watch::Sender<Vec<Calendar>>,
    pub events: watch::Sender<Vec<EventInstance>>,
}

impl Default for Views {
    fn default() -> Self {
        Self::new()
    }
}

impl Views {
    pub fn new() -> Self {
        Self {
            sources: watch::channel(Vec::new()).0,
            calendars: watch::channel(Vec::new()).0,
            events: watch::channel(Vec::new()).0,
        }
    }
}

pub fn compile_sources(store: &CacheStore) -> Vec<Source> {
    store.cached_sources().to_vec()
}

/// Calendars of every source, in source-list order; sources only known
/// through their calendar list follow, ordered by id. Unresolvable ids are
/// dropped.
pub fn compile_calendars(store: &CacheStore) -> Vec<Calendar> {
    let mut order: Vec<String> = store.cached_sources().iter().map(|s| s.id.clone()).collect();
    let mut extra: Vec<String> = store
        .calendars
        .keys()
        .filter(|id| !order.contains(id))
        .cloned()
        .collect();
    extra.sort();
    order.extend(extra);

    order
        .iter()
        .flat_map(|source| store.cached_calendars(source))
        .collect()
}

/// Projects every visible occurrence whose bucket lies in `range`. Pairs
/// whose template is missing are dropped.
pub fn compile_events(
    store: &CacheStore,
    hidden: &HashSet<String>,
    range: Option<&DateRange>,
    zone: DisplayZone,
) -> Vec<EventInstance> {
    let templates = store.templates();
    let mut events: Vec<EventInstance> = store
        .visible_occurrences(hidden, range)
        .iter()
        .filter_map(|occurrence| project(templates, occurrence, zone))
        .collect();
    events.sort_by(|a, b| {
        a.date
            .start
            .cmp(&b.date.start)
            .then_with(|| a.id.cmp(&b.id))
    });
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Event;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;

    fn counting_job(counter: Arc<AtomicUsize>) -> Job {
        Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_once_after_quiet_period() {
        let runs = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::spawn(
            "test",
            Duration::from_millis(50),
            CancellationToken::new(),
            counting_job(runs.clone()),
        );

        for _ in 0..10 {
            debouncer.schedule();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_run_separately() {
        let runs = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::spawn(
            "test",
            Duration::from_millis(50),
            CancellationToken::new(),
            counting_job(runs.clone()),
        );

        debouncer.schedule();
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.schedule();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_runs_immediately_and_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::spawn(
            "test",
            Duration::from_millis(50),
            CancellationToken::new(),
            counting_job(runs.clone()),
        );

        debouncer.schedule();
        debouncer.flush().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_flush_without_pending_job_is_ready() {
        let runs = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::spawn(
            "test",
            Duration::from_millis(50),
            CancellationToken::new(),
            counting_job(runs.clone()),
        );

        let mut flush = tokio_test::task::spawn(debouncer.flush());
        tokio_test::assert_ready!(flush.poll());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_runs_pending_job() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let debouncer = Debouncer::spawn(
            "test",
            Duration::from_secs(60),
            cancel.clone(),
            counting_job(runs.clone()),
        );

        debouncer.schedule();
        tokio::time::sleep(Duration::from_millis(1)).await;
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    fn utc(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, m, d, 9, 0, 0).unwrap()
    }

    fn calendar(id: &str, source: &str) -> Calendar {
        let mut cal = Calendar::new(source, id);
        cal.id = id.into();
        cal
    }

    fn event(id: &str, calendar: &str, start: DateTime<Utc>) -> Event {
        let mut e = Event::new(calendar, id, start, start + ChronoDuration::hours(1));
        e.id = id.into();
        e
    }

    #[test]
    fn test_compile_calendars_drops_orphans() {
        let mut store = CacheStore::new(600_000);
        store.put_sources(
            1,
            vec![Source {
                id: "s1".into(),
                name: "A".into(),
                settings: None,
                auth: None,
            }],
        );
        store.put_calendars(1, "s1", vec![calendar("c1", "s1"), calendar("c2", "s1")]);
        store.calendars_by_id.remove("c2");
        let compiled = compile_calendars(&store);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].id, "c1");
    }

    #[test]
    fn test_compile_events_sorted_deduped_and_filtered() {
        let mut store = CacheStore::new(600_000);
        let q1 = DateRange::new(utc(1, 1), utc(3, 31));
        store.record_fetch(
            1,
            "c1",
            &q1,
            vec![event("late", "c1", utc(3, 2)), event("early", "c1", utc(1, 5))],
        );
        store.record_fetch(1, "c2", &q1, vec![event("hidden", "c2", utc(2, 1))]);
        // Same pair inserted twice must only show once.
        store.insert_event(event("early", "c1", utc(1, 5)));

        let hidden: HashSet<String> = ["c2".to_string()].into_iter().collect();
        let compiled = compile_events(&store, &hidden, Some(&q1), DisplayZone::Local);
        let ids: Vec<&str> = compiled.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_compile_events_skips_missing_templates() {
        let mut store = CacheStore::new(600_000);
        let q1 = DateRange::new(utc(1, 1), utc(3, 31));
        store.record_fetch(1, "c1", &q1, vec![event("gone", "c1", utc(1, 5))]);
        store.templates.clear();
        assert!(compile_events(&store, &HashSet::new(), None, DisplayZone::Local).is_empty());
    }
}
