//! Alarm delivery.
//!
//! [`AlarmDispatcher::deliver_due`] is the single core operation: it
//! atomically selects due, unsent alarms and marks them sent. Two transports
//! sit on top of it and exactly one is active per deployment:
//!
//! - **poll** — a client asks for its own due alarms
//!   ([`AlarmDispatcher::poll_for_user`]), gated by the user's global alarm
//!   preference;
//! - **sweep** — [`SweepRunner`] delivers every user's due alarms on a fixed
//!   period ([`AlarmDispatcher::sweep`]).

pub mod runner;

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::calendar::{CalendarStore, ScheduleEvent};
use crate::config::AlarmDelivery;
use crate::error::{CompanionError, Result};
use crate::identity::IdentityStore;

pub use runner::{SweepReport, SweepRunner};

/// Whose alarms a delivery covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryScope {
    Owner(i64),
    All,
}

impl DeliveryScope {
    fn owner(self) -> Option<i64> {
        match self {
            Self::Owner(id) => Some(id),
            Self::All => None,
        }
    }
}

/// Finds due alarms and marks them delivered, at most once each.
pub struct AlarmDispatcher {
    store: Arc<dyn CalendarStore>,
    identity: Arc<dyn IdentityStore>,
    mode: AlarmDelivery,
}

impl std::fmt::Debug for AlarmDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmDispatcher")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl AlarmDispatcher {
    pub fn new(
        store: Arc<dyn CalendarStore>,
        identity: Arc<dyn IdentityStore>,
        mode: AlarmDelivery,
    ) -> Self {
        Self {
            store,
            identity,
            mode,
        }
    }

    pub fn mode(&self) -> AlarmDelivery {
        self.mode
    }

    /// Select and mark every due, unsent alarm in `scope`.
    pub fn deliver_due(&self, scope: DeliveryScope, now: NaiveDateTime) -> Result<Vec<ScheduleEvent>> {
        self.store.find_due_unsent_alarms(scope.owner(), now)
    }

    /// Due alarms for the calendar `user_id` acts on.
    ///
    /// Returns an empty list without touching events when the user has
    /// alarms switched off.
    pub fn poll_for_user(&self, user_id: i64, now: NaiveDateTime) -> Result<Vec<ScheduleEvent>> {
        self.require(AlarmDelivery::Poll)?;
        if !self.identity.alarm_enabled(user_id)? {
            debug!(user_id, "alarms disabled, poll short-circuited");
            return Ok(Vec::new());
        }
        let owner_id = self.identity.effective_owner(user_id)?;
        self.deliver_due(DeliveryScope::Owner(owner_id), now)
    }

    /// Due alarms of every user, regardless of preference.
    pub fn sweep(&self, now: NaiveDateTime) -> Result<Vec<ScheduleEvent>> {
        self.require(AlarmDelivery::Sweep)?;
        self.deliver_due(DeliveryScope::All, now)
    }

    fn require(&self, path: AlarmDelivery) -> Result<()> {
        if self.mode == path {
            Ok(())
        } else {
            Err(CompanionError::DeliveryPathInactive(path.as_str()))
        }
    }
}
