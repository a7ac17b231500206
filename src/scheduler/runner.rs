//! Periodic sweep loop.
//!
//! Spawns a tokio task that ticks on a fixed interval. In `sweep` delivery
//! mode each tick delivers every due alarm and forwards it on a channel for
//! the push transport; in `poll` mode alarm delivery is left to clients.
//! Expired verification codes are swept on their own interval in both modes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::calendar::ScheduleEvent;
use crate::config::{AlarmDelivery, SchedulerConfig};
use crate::scheduler::AlarmDispatcher;
use crate::verification::VerificationLedger;

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub alarms_delivered: usize,
    pub codes_expired: usize,
}

/// Background runner for alarm and verification sweeps.
pub struct SweepRunner {
    dispatcher: Arc<AlarmDispatcher>,
    ledger: Option<VerificationLedger>,
    notices: mpsc::UnboundedSender<ScheduleEvent>,
    tick_interval: Duration,
    verification_interval: Duration,
    cancel: CancellationToken,
}

impl SweepRunner {
    pub fn new(
        dispatcher: Arc<AlarmDispatcher>,
        notices: mpsc::UnboundedSender<ScheduleEvent>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            dispatcher,
            ledger: None,
            notices,
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
            verification_interval: Duration::from_secs(config.verification_sweep_secs.max(1)),
            cancel: CancellationToken::new(),
        }
    }

    /// Also sweep expired verification codes.
    pub fn with_verification(mut self, ledger: VerificationLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Stop the loop when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Deliver due alarms (sweep mode only) and forward them as notices.
    pub fn sweep_alarms(&self, now: NaiveDateTime) -> usize {
        if self.dispatcher.mode() != AlarmDelivery::Sweep {
            return 0;
        }
        if self.notices.is_closed() {
            // Marking alarms sent with nobody to push them would lose them.
            error!("alarm notice receiver closed; leaving due alarms undelivered");
            return 0;
        }
        match self.dispatcher.sweep(now) {
            Ok(delivered) => {
                let count = delivered.len();
                for event in delivered {
                    if let Err(lost) = self.notices.send(event) {
                        warn!(event_id = lost.0.id, "alarm notice receiver dropped");
                        break;
                    }
                }
                count
            }
            Err(e) => {
                // The transaction rolled back; due alarms stay due for the next tick.
                error!("alarm sweep failed: {e}");
                0
            }
        }
    }

    fn alarm_sink_closed(&self) -> bool {
        self.dispatcher.mode() == AlarmDelivery::Sweep && self.notices.is_closed()
    }

    /// Delete expired verification codes.
    pub fn sweep_codes(&self, now: NaiveDateTime) -> usize {
        let Some(ledger) = &self.ledger else {
            return 0;
        };
        ledger.sweep_expired(now).unwrap_or_else(|e| {
            error!("verification sweep failed: {e}");
            0
        })
    }

    /// Run both sweeps once.
    pub fn tick(&self, now: NaiveDateTime) -> SweepReport {
        let report = SweepReport {
            alarms_delivered: self.sweep_alarms(now),
            codes_expired: self.sweep_codes(now),
        };
        debug!(?report, "sweep tick");
        report
    }

    /// Spawn the loop. It exits when the cancellation token fires, or in
    /// sweep mode once the notice receiver is gone.
    pub fn run(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                mode = self.dispatcher.mode().as_str(),
                tick_secs = self.tick_interval.as_secs(),
                "sweep runner started"
            );
            let mut alarms = tokio::time::interval(self.tick_interval);
            let mut codes = tokio::time::interval(self.verification_interval);

            loop {
                tokio::select! {
                    () = self.cancel.cancelled() => break,
                    _ = alarms.tick() => {
                        if self.alarm_sink_closed() {
                            break;
                        }
                        self.sweep_alarms(Local::now().naive_local());
                    }
                    _ = codes.tick(), if self.ledger.is_some() => {
                        self.sweep_codes(Local::now().naive_local());
                    }
                }
            }
            info!("sweep runner stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::calendar::{CalendarService, NewEvent, SqliteCalendarStore};
    use crate::identity::SqliteIdentityStore;
    use crate::store::Database;
    use chrono::NaiveDate;

    fn at(y: i32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, 1, 1)
            .and_then(|d| d.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    struct Fixture {
        calendar: CalendarService,
        dispatcher: Arc<AlarmDispatcher>,
        ledger: VerificationLedger,
    }

    fn fixture(mode: AlarmDelivery) -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let identity = Arc::new(SqliteIdentityStore::new(db.clone()));
        identity.register_member(1, "할머니", at(2000, 0)).unwrap();
        let store = Arc::new(SqliteCalendarStore::new(db.clone()));
        Fixture {
            calendar: CalendarService::new(store.clone()),
            dispatcher: Arc::new(AlarmDispatcher::new(store, identity, mode)),
            ledger: VerificationLedger::new(db),
        }
    }

    #[test]
    fn tick_delivers_and_forwards_in_sweep_mode() {
        let f = fixture(AlarmDelivery::Sweep);
        f.calendar.add(NewEvent::new(1, "병원", at(2025, 9)), at(2025, 0)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = SweepRunner::new(f.dispatcher.clone(), tx, &SchedulerConfig::default());

        let report = runner.tick(at(2025, 9));
        assert_eq!(report.alarms_delivered, 1);
        assert_eq!(rx.try_recv().unwrap().title, "병원");
        assert_eq!(runner.tick(at(2025, 9)).alarms_delivered, 0);
    }

    #[test]
    fn closed_receiver_leaves_alarms_due() {
        let f = fixture(AlarmDelivery::Sweep);
        f.calendar.add(NewEvent::new(1, "병원", at(2025, 9)), at(2025, 0)).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let runner = SweepRunner::new(f.dispatcher.clone(), tx, &SchedulerConfig::default());
        assert_eq!(runner.tick(at(2025, 9)).alarms_delivered, 0);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = SweepRunner::new(f.dispatcher.clone(), tx, &SchedulerConfig::default());
        assert_eq!(runner.tick(at(2025, 9)).alarms_delivered, 1);
        assert_eq!(rx.try_recv().unwrap().title, "병원");
    }

    #[tokio::test]
    async fn run_stops_when_receiver_is_gone() {
        let f = fixture(AlarmDelivery::Sweep);
        f.calendar.add(NewEvent::new(1, "오래된 일정", at(2001, 9)), at(2000, 0)).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = SweepRunner::new(f.dispatcher.clone(), tx, &SchedulerConfig::default()).run();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(f.dispatcher.sweep(at(2025, 0)).unwrap().len(), 1);
    }

    #[test]
    fn poll_mode_tick_leaves_alarms_for_clients() {
        let f = fixture(AlarmDelivery::Poll);
        f.calendar.add(NewEvent::new(1, "병원", at(2025, 9)), at(2025, 0)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner = SweepRunner::new(f.dispatcher.clone(), tx, &SchedulerConfig::default());

        assert_eq!(runner.tick(at(2025, 9)).alarms_delivered, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(f.dispatcher.poll_for_user(1, at(2025, 9)).unwrap().len(), 1);
    }

    #[test]
    fn tick_sweeps_expired_codes() {
        let f = fixture(AlarmDelivery::Poll);
        f.ledger
            .issue("010", "1234", at(2025, 0), chrono::Duration::minutes(5))
            .unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let runner = SweepRunner::new(f.dispatcher.clone(), tx, &SchedulerConfig::default())
            .with_verification(f.ledger.clone());
        assert_eq!(runner.tick(at(2025, 1)).codes_expired, 1);
    }

    #[tokio::test]
    async fn run_delivers_on_first_tick_and_stops_on_cancel() {
        let f = fixture(AlarmDelivery::Sweep);
        // Long past, so it is due on the first (immediate) tick.
        f.calendar.add(NewEvent::new(1, "오래된 일정", at(2001, 9)), at(2000, 0)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = SweepRunner::new(f.dispatcher.clone(), tx, &SchedulerConfig::default())
            .with_cancellation(cancel.clone())
            .run();

        let notice = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice.title, "오래된 일정");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
