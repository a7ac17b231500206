//! Schedule event entity and the alarm recompute rule.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Pre-alarm used when a command does not specify one.
pub const DEFAULT_ALARM_MINUTES: i64 = 10;

/// Event length used when no end is given.
pub const DEFAULT_EVENT_LENGTH_MINUTES: i64 = 60;

/// Largest accepted pre-alarm: one week.
pub const MAX_ALARM_MINUTES: i64 = 7 * 24 * 60;

/// Recurrence of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatKind {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

/// Display priority of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

pub(crate) fn repeat_to_str(kind: RepeatKind) -> &'static str {
    match kind {
        RepeatKind::None => "none",
        RepeatKind::Daily => "daily",
        RepeatKind::Weekly => "weekly",
        RepeatKind::Monthly => "monthly",
    }
}

pub(crate) fn str_to_repeat(s: &str) -> RepeatKind {
    match s {
        "daily" => RepeatKind::Daily,
        "weekly" => RepeatKind::Weekly,
        "monthly" => RepeatKind::Monthly,
        _ => RepeatKind::None,
    }
}

pub(crate) fn priority_to_str(p: Priority) -> &'static str {
    match p {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
    }
}

pub(crate) fn str_to_priority(s: &str) -> Priority {
    match s {
        "low" => Priority::Low,
        "high" => Priority::High,
        _ => Priority::Medium,
    }
}

/// Lifecycle of one alarm occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmState {
    /// No alarm configured.
    Unset,
    /// Alarm time still in the future.
    Pending,
    /// Alarm time reached, not yet delivered.
    Due,
    /// Delivered; terminal until start or offset changes.
    Delivered,
}

/// A calendar entry owned by one elder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub all_day: bool,
    pub repeat: RepeatKind,
    pub priority: Priority,
    /// Minutes before `start_at` at which to remind.
    pub alarm_minutes: Option<i64>,
    /// Always `start_at - alarm_minutes`, or `None` without an offset.
    pub alarm_at: Option<NaiveDateTime>,
    pub alarm_sent: bool,
    pub completed: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// `start - minutes`; negative offsets disable the alarm, as does an
/// offset that leaves the representable range.
pub fn compute_alarm_at(start: NaiveDateTime, minutes: Option<i64>) -> Option<NaiveDateTime> {
    minutes
        .filter(|m| *m >= 0)
        .and_then(Duration::try_minutes)
        .and_then(|offset| start.checked_sub_signed(offset))
}

/// Whether `minutes` is an acceptable pre-alarm offset.
pub fn alarm_offset_in_range(minutes: Option<i64>) -> bool {
    minutes.is_none_or(|m| m <= MAX_ALARM_MINUTES)
}

fn default_end(start: NaiveDateTime) -> NaiveDateTime {
    start
        .checked_add_signed(Duration::minutes(DEFAULT_EVENT_LENGTH_MINUTES))
        .unwrap_or(start)
}

impl ScheduleEvent {
    /// Where this event's alarm occurrence stands at `now`.
    pub fn alarm_state(&self, now: NaiveDateTime) -> AlarmState {
        match self.alarm_at {
            None => AlarmState::Unset,
            Some(_) if self.alarm_sent => AlarmState::Delivered,
            Some(at) if at <= now => AlarmState::Due,
            Some(_) => AlarmState::Pending,
        }
    }

    /// Apply a partial update.
    ///
    /// A change of `start_at` or of the alarm offset recomputes `alarm_at`
    /// and re-arms the occurrence (`alarm_sent = false`).
    pub fn apply(&mut self, patch: &EventPatch, now: NaiveDateTime) {
        let mut rearm = false;
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(location) = &patch.location {
            self.location = location.clone();
        }
        if let Some(start) = patch.start_at {
            if start != self.start_at {
                rearm = true;
            }
            self.start_at = start;
        }
        if let Some(end) = patch.end_at {
            self.end_at = end;
        }
        if self.end_at < self.start_at {
            self.end_at = default_end(self.start_at);
        }
        if let Some(minutes) = patch.alarm_minutes {
            if minutes != self.alarm_minutes {
                rearm = true;
            }
            self.alarm_minutes = minutes;
        }
        if let Some(all_day) = patch.all_day {
            self.all_day = all_day;
        }
        if let Some(repeat) = patch.repeat {
            self.repeat = repeat;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if rearm {
            self.alarm_at = compute_alarm_at(self.start_at, self.alarm_minutes);
            self.alarm_sent = false;
        }
        self.updated_at = now;
    }
}

/// Fields for a new event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub owner_id: i64,
    pub title: String,
    pub start_at: NaiveDateTime,
    /// Defaults to one hour after the start.
    pub end_at: Option<NaiveDateTime>,
    pub alarm_minutes: Option<i64>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub all_day: bool,
    pub repeat: RepeatKind,
    pub priority: Priority,
}

impl NewEvent {
    /// One-hour event with the default pre-alarm.
    pub fn new(owner_id: i64, title: impl Into<String>, start_at: NaiveDateTime) -> Self {
        Self {
            owner_id,
            title: title.into(),
            start_at,
            end_at: None,
            alarm_minutes: Some(DEFAULT_ALARM_MINUTES),
            description: None,
            location: None,
            all_day: false,
            repeat: RepeatKind::None,
            priority: Priority::Medium,
        }
    }

    pub fn with_alarm_minutes(mut self, minutes: Option<i64>) -> Self {
        self.alarm_minutes = minutes;
        self
    }

    pub fn with_end(mut self, end_at: NaiveDateTime) -> Self {
        self.end_at = Some(end_at);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// End time after defaulting and clamping to the start.
    pub fn resolved_end(&self) -> NaiveDateTime {
        match self.end_at {
            Some(end) if end >= self.start_at => end,
            _ => default_end(self.start_at),
        }
    }
}

/// Partial update; `None` leaves a field unchanged.
///
/// Nullable fields use `Some(None)` to clear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub start_at: Option<NaiveDateTime>,
    pub end_at: Option<NaiveDateTime>,
    pub alarm_minutes: Option<Option<i64>>,
    pub all_day: Option<bool>,
    pub repeat: Option<RepeatKind>,
    pub priority: Option<Priority>,
    pub completed: Option<bool>,
}
