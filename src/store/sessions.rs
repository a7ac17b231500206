//! Session store: conversation threads owned by a single user.

use chrono::NaiveDateTime;
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

use super::Database;
use super::types::{Session, db_time, normalize_region, row_time};
use crate::config::DEFAULT_REGION;
use crate::error::{CompanionError, Result};

const SESSION_COLUMNS: &str = "id, user_id, region_code, title, created_at, updated_at";

/// Durable mapping of sessions to their owner, title and region.
#[derive(Debug, Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a session. A missing or blank region falls back to `std`.
    pub fn create(&self, user_id: i64, region: Option<&str>, now: NaiveDateTime) -> Result<Session> {
        let region = normalize_region(region).unwrap_or_else(|| DEFAULT_REGION.to_owned());
        let conn = self.db.lock()?;
        let ts = db_time(&now);
        conn.execute(
            "INSERT INTO chat_sessions (user_id, region_code, title, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?3)",
            params![user_id, region, ts],
        )?;
        let id = conn.last_insert_rowid();
        debug!(session_id = id, user_id, region = %region, "session created");
        load(&conn, id)?.ok_or_else(|| CompanionError::NotFound(format!("session {id}")))
    }

    /// Fetch a session regardless of owner.
    pub fn get(&self, id: i64) -> Result<Option<Session>> {
        let conn = self.db.lock()?;
        load(&conn, id)
    }

    /// Fetch a session and check that `user_id` owns it.
    ///
    /// Unknown ids yield `NotFound`; foreign sessions yield `Unauthorized`.
    pub fn get_owned(&self, user_id: i64, id: i64) -> Result<Session> {
        let session = self
            .get(id)?
            .ok_or_else(|| CompanionError::NotFound(format!("session {id}")))?;
        if session.user_id != user_id {
            return Err(CompanionError::Unauthorized(format!(
                "session {id} does not belong to user {user_id}"
            )));
        }
        Ok(session)
    }

    /// Resolve the session for a turn.
    ///
    /// With an id the session must belong to `user_id`; a non-blank
    /// `region` replaces its region in place. Without an id a new session
    /// is created with `region`, or `default_region` when absent.
    pub fn resolve(
        &self,
        user_id: i64,
        session_id: Option<i64>,
        region: Option<&str>,
        default_region: &str,
        now: NaiveDateTime,
    ) -> Result<Session> {
        let region = normalize_region(region);
        match session_id {
            Some(id) => {
                let mut session = self.get_owned(user_id, id)?;
                if let Some(region) = region {
                    if region != session.region_code {
                        let conn = self.db.lock()?;
                        conn.execute(
                            "UPDATE chat_sessions SET region_code = ?1, updated_at = ?2 WHERE id = ?3",
                            params![region, db_time(&now), id],
                        )?;
                        debug!(session_id = id, region = %region, "session region updated");
                        session.region_code = region;
                        session.updated_at = now;
                    }
                }
                Ok(session)
            }
            None => self.create(
                user_id,
                Some(region.as_deref().unwrap_or(default_region)),
                now,
            ),
        }
    }

    /// Bump `updated_at`.
    pub fn touch(&self, id: i64, now: NaiveDateTime) -> Result<()> {
        let conn = self.db.lock()?;
        conn.execute(
            "UPDATE chat_sessions SET updated_at = ?1 WHERE id = ?2",
            params![db_time(&now), id],
        )?;
        Ok(())
    }

    /// Set the title if none is set yet. Returns whether this call set it.
    pub fn set_title_once(&self, id: i64, title: &str, now: NaiveDateTime) -> Result<bool> {
        let conn = self.db.lock()?;
        let changed = conn.execute(
            "UPDATE chat_sessions SET title = ?1, updated_at = ?2 WHERE id = ?3 AND title IS NULL",
            params![title, db_time(&now), id],
        )?;
        Ok(changed == 1)
    }

    /// All sessions of a user, newest first.
    pub fn list_for_user(&self, user_id: i64) -> Result<Vec<Session>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions
             WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_session)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete a session owned by `user_id` together with its messages.
    pub fn delete_owned(&self, user_id: i64, id: i64) -> Result<()> {
        self.get_owned(user_id, id)?;
        let conn = self.db.lock()?;
        let tx = conn.unchecked_transaction()?;
        let removed = tx.execute("DELETE FROM chat_messages WHERE session_id = ?1", params![id])?;
        tx.execute("DELETE FROM chat_sessions WHERE id = ?1", params![id])?;
        tx.commit()?;
        info!(session_id = id, messages = removed, "session deleted");
        Ok(())
    }
}

fn load(conn: &rusqlite::Connection, id: i64) -> Result<Option<Session>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?1"),
            params![id],
            row_to_session,
        )
        .optional()?)
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        region_code: row.get(2)?,
        title: row.get(3)?,
        created_at: row_time(row, 4)?,
        updated_at: row_time(row, 5)?,
    })
}
