// file: src/repository/mutations.rs
//! Remote-first mutations. The cache is only touched once the server has
//! accepted the change.

use crate::error::{AppError, AppResult};
use crate::models::{
    Calendar, CalendarChanges, Event, EventChanges, MoveOutcome, Source, SourceChanges,
};
use crate::utils::logging::log_mutation;

use super::Repository;

impl Repository {
    fn fail(&self, action: &str, what: &str, error: AppError) -> AppError {
        self.warn(format!("Failed to {} {}: {}", action, what, error.to_safe_string()), None);
        error
    }

    // --- Sources ---

    /// Creates a source, then loads its calendars and their events in the
    /// background.
    pub async fn create_source(&self, mut source: Source) -> AppResult<Source> {
        source.id = self
            .inner
            .api
            .create_source(&source)
            .await
            .map_err(|e| self.fail("create source", &source.name, e))?;
        log_mutation("Created", "source", &source.id);

        let now = self.now_ms();
        self.state().cache().add_source(now, source.clone());
        self.schedule_sources();
        self.schedule_save();

        let repo = self.clone();
        let id = source.id.clone();
        self.spawn_background("source refresh", async move {
            repo.refresh_source(&id, false).await;
        });
        Ok(source)
    }

    /// Sends the flagged fields of `source`, then refetches its calendars
    /// and events in the background.
    pub async fn edit_source(&self, source: Source, changes: SourceChanges) -> AppResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        self.inner
            .api
            .edit_source(&source, changes)
            .await
            .map_err(|e| self.fail("edit source", &source.name, e))?;
        log_mutation("Edited", "source", &source.id);

        let now = self.now_ms();
        self.state().cache().replace_source(now, source.clone());
        self.schedule_sources();
        self.schedule_save();

        let repo = self.clone();
        self.spawn_background("source refresh", async move {
            repo.refresh_source(&source.id, true).await;
        });
        Ok(())
    }

    /// Deletes a source with its calendars and their events.
    pub async fn delete_source(&self, id: &str) -> AppResult<()> {
        let name = self
            .state()
            .cache()
            .source_name(id)
            .unwrap_or_else(|| id.to_string());
        self.inner
            .api
            .delete_source(id)
            .await
            .map_err(|e| self.fail("delete source", &name, e))?;
        log_mutation("Deleted", "source", id);

        let calendars = self.state().cache().remove_source(id);
        self.state().visibility().forget(&[id.to_string()], &calendars);
        self.inner.tracker.remove_faulty_source(id);
        for calendar in &calendars {
            self.inner.tracker.remove_faulty_calendar(calendar);
        }
        self.schedule_all();
        self.schedule_save();
        Ok(())
    }

    // --- Calendars ---

    /// Creates a calendar under `calendar.source` and fetches its events
    /// for the active range in the background.
    pub async fn create_calendar(&self, mut calendar: Calendar) -> AppResult<Calendar> {
        if calendar.source.is_empty() {
            return Err(AppError::invalid_input("calendar has no source"));
        }
        calendar.id = self
            .inner
            .api
            .create_calendar(&calendar)
            .await
            .map_err(|e| self.fail("create calendar", &calendar.name, e))?;
        log_mutation("Created", "calendar", &calendar.id);

        self.state().cache().add_calendar(calendar.clone());
        self.schedule_calendars();
        self.schedule_save();

        if let Some(range) = self.active_range() {
            let repo = self.clone();
            let created = calendar.clone();
            self.spawn_background("calendar refresh", async move {
                if let Err(e) = repo
                    .get_events_from_calendar(&created.id, range.start, range.end, false)
                    .await
                {
                    repo.warn(
                        format!("Failed to fetch events from {}: {}", created.name, e.to_safe_string()),
                        None,
                    );
                }
            });
        }
        Ok(calendar)
    }

    pub async fn edit_calendar(&self, calendar: Calendar, changes: CalendarChanges) -> AppResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        self.inner
            .api
            .edit_calendar(&calendar, changes)
            .await
            .map_err(|e| self.fail("edit calendar", &calendar.name, e))?;
        log_mutation("Edited", "calendar", &calendar.id);

        self.state().cache().replace_calendar(calendar);
        self.schedule_calendars();
        self.schedule_events();
        self.schedule_save();
        Ok(())
    }

    /// Deletes a calendar with its month buckets and templates.
    pub async fn delete_calendar(&self, id: &str) -> AppResult<()> {
        let name = self
            .state()
            .cache()
            .calendar(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.to_string());
        self.inner
            .api
            .delete_calendar(id)
            .await
            .map_err(|e| self.fail("delete calendar", &name, e))?;
        log_mutation("Deleted", "calendar", id);

        self.state().cache().remove_calendar(id);
        self.state().visibility().forget(&[], &[id.to_string()]);
        self.inner.tracker.remove_faulty_calendar(id);
        self.schedule_calendars();
        self.schedule_events();
        self.schedule_save();
        Ok(())
    }

    // --- Events ---

    pub async fn create_event(&self, mut event: Event) -> AppResult<Event> {
        self.zone().normalize_all_day(&mut event);
        event.id = self
            .inner
            .api
            .create_event(&event)
            .await
            .map_err(|e| self.fail("create event", &event.name, e))?;
        log_mutation("Created", "event", &event.id);

        self.state().cache().insert_event(event.clone());
        self.schedule_events();
        self.schedule_save();
        Ok(event)
    }

    /// Sends the flagged fields of `event` and re-indexes it under the
    /// months it now spans.
    pub async fn edit_event(&self, mut event: Event, changes: EventChanges) -> AppResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        self.zone().normalize_all_day(&mut event);
        self.inner
            .api
            .edit_event(&event, changes)
            .await
            .map_err(|e| self.fail("edit event", &event.name, e))?;
        log_mutation("Edited", "event", &event.id);

        self.state().cache().update_event(event);
        self.schedule_events();
        self.schedule_save();
        Ok(())
    }

    pub async fn delete_event(&self, id: &str) -> AppResult<()> {
        let name = self
            .state()
            .cache()
            .template(id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| id.to_string());
        self.inner
            .api
            .delete_event(id)
            .await
            .map_err(|e| self.fail("delete event", &name, e))?;
        log_mutation("Deleted", "event", id);

        self.state().cache().remove_event(id);
        self.schedule_events();
        self.schedule_save();
        Ok(())
    }

    /// Moves an event to another calendar by creating a copy there and
    /// deleting the original. If the create fails nothing has changed and
    /// the error is returned. If the delete fails the copy is deleted
    /// again; the outcome says whether that worked.
    pub async fn move_event(&self, event: &Event, to_calendar: &str) -> AppResult<MoveOutcome> {
        if event.calendar == to_calendar {
            return Ok(MoveOutcome::Moved(event.clone()));
        }

        let mut copy = event.clone();
        copy.id = String::new();
        copy.calendar = to_calendar.to_string();
        self.zone().normalize_all_day(&mut copy);

        copy.id = self
            .inner
            .api
            .create_event(&copy)
            .await
            .map_err(|e| self.fail("move event", &event.name, e))?;
        log_mutation("Created", "event copy", &copy.id);
        self.state().cache().insert_event(copy.clone());

        let outcome = match self.inner.api.delete_event(&event.id).await {
            Ok(()) => {
                log_mutation("Moved", "event", &event.id);
                self.state().cache().remove_event(&event.id);
                MoveOutcome::Moved(copy)
            }
            Err(delete_error) => {
                let error = delete_error.to_safe_string();
                match self.inner.api.delete_event(&copy.id).await {
                    // Already gone counts as rolled back.
                    Ok(()) | Err(AppError::Server { status: 404, .. }) | Err(AppError::NotFound(_)) => {
                        log_mutation("Rolled back", "event copy", &copy.id);
                        self.state().cache().remove_event(&copy.id);
                        self.warn(format!("Failed to move event {}: {}", event.name, error), None);
                        MoveOutcome::RolledBack {
                            original: event.clone(),
                            error,
                        }
                    }
                    Err(rollback_error) => {
                        log::error!(
                            "[Mutation] Event {} now exists in {} and {}: {}",
                            event.id,
                            event.calendar,
                            to_calendar,
                            rollback_error
                        );
                        self.warn(
                            format!("Event {} was copied but could not be moved: {}", event.name, error),
                            None,
                        );
                        MoveOutcome::Duplicated {
                            original: event.clone(),
                            copy,
                            error,
                        }
                    }
                }
            }
        };

        self.schedule_events();
        self.schedule_save();
        Ok(outcome)
    }
}
