// file: src/repository/storage.rs
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use super::{lock, Repository};
use crate::error::AppResult;

impl Repository {
    /// Replaces the in-memory cache and visibility with what storage holds,
    /// unless storage still holds this instance's own last save. Returns
    /// whether anything was reloaded.
    pub async fn reload_from_storage(&self) -> AppResult<bool> {
        let Some(stored) = self.inner.persistence.load_if_changed().await? else {
            return Ok(false);
        };
        info!("[Storage] Reloading cache written elsewhere at {}", stored.timestamp);
        self.state().restore(stored);
        self.state().compile_all();
        Ok(true)
    }

    pub(super) fn start_storage_poller(&self, interval: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let repo = Repository { inner };
                        if let Err(e) = repo.reload_from_storage().await {
                            warn!("[Storage] Poll failed: {}", e);
                        }
                    }
                }
            }
            debug!("[Storage] Poller stopped");
        });

        *lock(&self.inner.poller) = Some(handle);
    }

    /// Runs pending compilations and the pending save now.
    pub async fn flush(&self) {
        let jobs = &self.inner.jobs;
        jobs.sources.flush().await;
        jobs.calendars.flush().await;
        jobs.events.flush().await;
        jobs.save.flush().await;
    }

    /// Zeroes every cache timestamp so the next read of anything goes to
    /// the network, and saves.
    pub fn invalidate_cache(&self) {
        info!("[Repository] Cache invalidated");
        self.state().cache().invalidate_all();
        self.schedule_save();
    }

    /// Flushes pending work, stops the background workers and closes the
    /// database. Collections stay readable; storage is gone.
    pub async fn shutdown(&self) {
        self.flush().await;
        self.inner.cancel.cancel();
        if let Some(handle) = lock(&self.inner.poller).take() {
            handle.abort();
        }
        self.inner.persistence.database().close().await;
        info!("[Repository] Shut down");
    }
}
