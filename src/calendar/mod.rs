//! Calendar events and their reminder alarms.
//!
//! [`CalendarStore`] is the narrow persistence seam; [`CalendarService`]
//! adds owner checks and the day/month views used by the conversation
//! pipeline and by hosts.

mod sqlite;
pub mod types;

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::info;

use crate::error::{CompanionError, Result};

pub use sqlite::SqliteCalendarStore;
pub use types::{
    AlarmState, EventPatch, NewEvent, Priority, RepeatKind, ScheduleEvent, DEFAULT_ALARM_MINUTES,
    MAX_ALARM_MINUTES,
};

fn check_alarm_offset(minutes: Option<i64>) -> Result<()> {
    if types::alarm_offset_in_range(minutes) {
        Ok(())
    } else {
        Err(CompanionError::Validation(format!(
            "alarm offset must be at most {MAX_ALARM_MINUTES} minutes"
        )))
    }
}

/// Persistence interface for schedule events.
pub trait CalendarStore: Send + Sync {
    /// Events of `owner_id` starting in `[from, to)`, earliest first.
    fn list_by_owner_and_date_range(
        &self,
        owner_id: i64,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<ScheduleEvent>>;

    /// Earliest event of `owner_id` starting at or after `from` whose title
    /// contains `fragment`.
    fn find_next_by_title(
        &self,
        owner_id: i64,
        fragment: &str,
        from: NaiveDateTime,
    ) -> Result<Option<ScheduleEvent>>;

    fn get(&self, id: i64) -> Result<Option<ScheduleEvent>>;

    fn create(&self, event: NewEvent, now: NaiveDateTime) -> Result<ScheduleEvent>;

    /// Apply a patch, re-arming the alarm when start or offset change.
    fn update_fields(&self, id: i64, patch: &EventPatch, now: NaiveDateTime) -> Result<ScheduleEvent>;

    fn delete_by_id(&self, id: i64) -> Result<()>;

    /// Atomically select every due, unsent alarm (optionally for one owner)
    /// and mark it sent. Each occurrence is returned by exactly one call.
    fn find_due_unsent_alarms(
        &self,
        owner_id: Option<i64>,
        now: NaiveDateTime,
    ) -> Result<Vec<ScheduleEvent>>;
}

/// Owner-checked calendar operations.
#[derive(Clone)]
pub struct CalendarService {
    store: Arc<dyn CalendarStore>,
}

impl std::fmt::Debug for CalendarService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarService").finish_non_exhaustive()
    }
}

fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(NaiveTime::MIN);
    (start, start + Duration::days(1))
}

impl CalendarService {
    pub fn new(store: Arc<dyn CalendarStore>) -> Self {
        Self { store }
    }

    /// Underlying store, shared with the alarm dispatcher.
    pub fn store(&self) -> Arc<dyn CalendarStore> {
        Arc::clone(&self.store)
    }

    /// Create an event. Blank titles are rejected.
    pub fn add(&self, event: NewEvent, now: NaiveDateTime) -> Result<ScheduleEvent> {
        if event.title.trim().is_empty() {
            return Err(CompanionError::Validation("event title is empty".into()));
        }
        check_alarm_offset(event.alarm_minutes)?;
        let created = self.store.create(event, now)?;
        info!(event_id = created.id, owner_id = created.owner_id, "schedule added");
        Ok(created)
    }

    /// Events starting on `date`, earliest first.
    pub fn events_on(&self, owner_id: i64, date: NaiveDate) -> Result<Vec<ScheduleEvent>> {
        let (from, to) = day_bounds(date);
        self.store.list_by_owner_and_date_range(owner_id, from, to)
    }

    /// Distinct days of `year`-`month` that have at least one event.
    pub fn month_dates(&self, owner_id: i64, year: i32, month: u32) -> Result<Vec<NaiveDate>> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| CompanionError::Validation(format!("invalid month {year}-{month}")))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| CompanionError::Validation(format!("invalid month {year}-{month}")))?;

        let events = self.store.list_by_owner_and_date_range(
            owner_id,
            first.and_time(NaiveTime::MIN),
            next.and_time(NaiveTime::MIN),
        )?;
        let mut dates: Vec<NaiveDate> = events.iter().map(|e| e.start_at.date()).collect();
        dates.dedup();
        Ok(dates)
    }

    /// Fetch an event that must belong to `owner_id`.
    pub fn get_owned(&self, owner_id: i64, id: i64) -> Result<ScheduleEvent> {
        let event = self
            .store
            .get(id)?
            .ok_or_else(|| CompanionError::NotFound(format!("event {id}")))?;
        if event.owner_id != owner_id {
            return Err(CompanionError::Unauthorized(format!(
                "event {id} does not belong to user {owner_id}"
            )));
        }
        Ok(event)
    }

    pub fn update_event(
        &self,
        owner_id: i64,
        id: i64,
        patch: &EventPatch,
        now: NaiveDateTime,
    ) -> Result<ScheduleEvent> {
        if let Some(minutes) = patch.alarm_minutes {
            check_alarm_offset(minutes)?;
        }
        self.get_owned(owner_id, id)?;
        self.store.update_fields(id, patch, now)
    }

    /// Flip the completion mark.
    pub fn toggle_completed(&self, owner_id: i64, id: i64, now: NaiveDateTime) -> Result<ScheduleEvent> {
        let event = self.get_owned(owner_id, id)?;
        let patch = EventPatch {
            completed: Some(!event.completed),
            ..Default::default()
        };
        self.store.update_fields(id, &patch, now)
    }

    pub fn delete_event(&self, owner_id: i64, id: i64) -> Result<()> {
        self.get_owned(owner_id, id)?;
        self.store.delete_by_id(id)
    }

    /// Delete the nearest upcoming event whose title contains `fragment`.
    ///
    /// Returns the deleted event, or `None` when nothing matches.
    pub fn delete_nearest_future_by_title(
        &self,
        owner_id: i64,
        fragment: &str,
        now: NaiveDateTime,
    ) -> Result<Option<ScheduleEvent>> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Err(CompanionError::Validation("title fragment is empty".into()));
        }
        let Some(event) = self.store.find_next_by_title(owner_id, fragment, now)? else {
            return Ok(None);
        };
        self.store.delete_by_id(event.id)?;
        info!(event_id = event.id, owner_id, "schedule deleted by title");
        Ok(Some(event))
    }
}
