//! SQLite-backed calendar store.

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info};

use super::CalendarStore;
use super::types::{
    EventPatch, NewEvent, ScheduleEvent, compute_alarm_at, priority_to_str, repeat_to_str,
    str_to_priority, str_to_repeat,
};
use crate::error::{CompanionError, Result};
use crate::store::Database;
use crate::store::types::{db_time, row_opt_time, row_time};

const EVENT_COLUMNS: &str = "id, owner_id, title, description, location, start_at, end_at, \
     all_day, repeat_kind, priority, alarm_minutes, alarm_at, alarm_sent, completed, \
     created_at, updated_at";

/// [`CalendarStore`] over the shared companion database.
#[derive(Debug, Clone)]
pub struct SqliteCalendarStore {
    db: Database,
}

impl SqliteCalendarStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl CalendarStore for SqliteCalendarStore {
    fn list_by_owner_and_date_range(
        &self,
        owner_id: i64,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<ScheduleEvent>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM schedule_events
             WHERE owner_id = ?1 AND start_at >= ?2 AND start_at < ?3
             ORDER BY start_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![owner_id, db_time(&from), db_time(&to)], row_to_event)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn find_next_by_title(
        &self,
        owner_id: i64,
        fragment: &str,
        from: NaiveDateTime,
    ) -> Result<Option<ScheduleEvent>> {
        let conn = self.db.lock()?;
        let pattern = format!("%{}%", escape_like(fragment));
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM schedule_events
                     WHERE owner_id = ?1 AND start_at >= ?2 AND title LIKE ?3 ESCAPE '\\'
                     ORDER BY start_at ASC, id ASC LIMIT 1"
                ),
                params![owner_id, db_time(&from), pattern],
                row_to_event,
            )
            .optional()?)
    }

    fn get(&self, id: i64) -> Result<Option<ScheduleEvent>> {
        let conn = self.db.lock()?;
        load(&conn, id)
    }

    fn create(&self, event: NewEvent, now: NaiveDateTime) -> Result<ScheduleEvent> {
        let conn = self.db.lock()?;
        let alarm_at = compute_alarm_at(event.start_at, event.alarm_minutes);
        conn.execute(
            "INSERT INTO schedule_events (owner_id, title, description, location, start_at, end_at,
                 all_day, repeat_kind, priority, alarm_minutes, alarm_at, alarm_sent, completed,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, 0, ?12, ?12)",
            params![
                event.owner_id,
                event.title,
                event.description,
                event.location,
                db_time(&event.start_at),
                db_time(&event.resolved_end()),
                event.all_day,
                repeat_to_str(event.repeat),
                priority_to_str(event.priority),
                event.alarm_minutes,
                alarm_at.as_ref().map(db_time),
                db_time(&now),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(event_id = id, owner_id = event.owner_id, "event created");
        load(&conn, id)?.ok_or_else(|| CompanionError::NotFound(format!("event {id}")))
    }

    fn update_fields(&self, id: i64, patch: &EventPatch, now: NaiveDateTime) -> Result<ScheduleEvent> {
        let conn = self.db.lock()?;
        let tx = conn.unchecked_transaction()?;
        let mut event =
            load(&tx, id)?.ok_or_else(|| CompanionError::NotFound(format!("event {id}")))?;
        event.apply(patch, now);
        tx.execute(
            "UPDATE schedule_events SET title = ?1, description = ?2, location = ?3,
                 start_at = ?4, end_at = ?5, all_day = ?6, repeat_kind = ?7, priority = ?8,
                 alarm_minutes = ?9, alarm_at = ?10, alarm_sent = ?11, completed = ?12,
                 updated_at = ?13
             WHERE id = ?14",
            params![
                event.title,
                event.description,
                event.location,
                db_time(&event.start_at),
                db_time(&event.end_at),
                event.all_day,
                repeat_to_str(event.repeat),
                priority_to_str(event.priority),
                event.alarm_minutes,
                event.alarm_at.as_ref().map(db_time),
                event.alarm_sent,
                event.completed,
                db_time(&event.updated_at),
                id,
            ],
        )?;
        tx.commit()?;
        Ok(event)
    }

    fn delete_by_id(&self, id: i64) -> Result<()> {
        let conn = self.db.lock()?;
        let removed = conn.execute("DELETE FROM schedule_events WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(CompanionError::NotFound(format!("event {id}")));
        }
        debug!(event_id = id, "event deleted");
        Ok(())
    }

    fn find_due_unsent_alarms(
        &self,
        owner_id: Option<i64>,
        now: NaiveDateTime,
    ) -> Result<Vec<ScheduleEvent>> {
        let mut conn = self.db.lock()?;
        // Write lock from the first statement: select and flip are one unit.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let due = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM schedule_events
                 WHERE alarm_sent = 0 AND alarm_at IS NOT NULL AND alarm_at <= ?1
                   AND (?2 IS NULL OR owner_id = ?2)
                 ORDER BY alarm_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![db_time(&now), owner_id], row_to_event)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut delivered = Vec::with_capacity(due.len());
        for mut event in due {
            let flipped = tx.execute(
                "UPDATE schedule_events SET alarm_sent = 1 WHERE id = ?1 AND alarm_sent = 0",
                params![event.id],
            )?;
            if flipped == 1 {
                event.alarm_sent = true;
                delivered.push(event);
            }
        }
        tx.commit()?;

        if !delivered.is_empty() {
            info!(count = delivered.len(), ?owner_id, "due alarms marked as sent");
        }
        Ok(delivered)
    }
}

fn load(conn: &Connection, id: i64) -> Result<Option<ScheduleEvent>> {
    Ok(conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM schedule_events WHERE id = ?1"),
            params![id],
            row_to_event,
        )
        .optional()?)
}

fn escape_like(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for ch in fragment.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleEvent> {
    let repeat: String = row.get(8)?;
    let priority: String = row.get(9)?;
    Ok(ScheduleEvent {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        location: row.get(4)?,
        start_at: row_time(row, 5)?,
        end_at: row_time(row, 6)?,
        all_day: row.get(7)?,
        repeat: str_to_repeat(&repeat),
        priority: str_to_priority(&priority),
        alarm_minutes: row.get(10)?,
        alarm_at: row_opt_time(row, 11)?,
        alarm_sent: row.get(12)?,
        completed: row.get(13)?,
        created_at: row_time(row, 14)?,
        updated_at: row_time(row, 15)?,
    })
}
