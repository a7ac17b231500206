//! Append-only message log.

use chrono::{NaiveDateTime, Timelike as _};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::Database;
use super::types::{Message, Role, db_time, row_time};
use crate::error::{CompanionError, Result};

/// Number of user turns carrying one emotion label in a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionCount {
    pub emotion: String,
    pub count: u32,
}

/// Ordered record of turns per session.
#[derive(Debug, Clone)]
pub struct MessageLog {
    db: Database,
}

impl MessageLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a turn. The emotion is kept only for user turns.
    pub fn append(
        &self,
        session_id: i64,
        role: Role,
        content: &str,
        emotion: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<Message> {
        let emotion = match role {
            Role::User => emotion.map(str::to_owned),
            Role::Assistant | Role::System => None,
        };
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO chat_messages (session_id, role, content, emotion, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, role.as_str(), content, emotion, db_time(&now)],
        )?;
        Ok(Message {
            id: conn.last_insert_rowid(),
            session_id,
            role,
            content: content.to_owned(),
            emotion,
            created_at: now.with_nanosecond(0).unwrap_or(now),
        })
    }

    /// The `limit` most recent turns of a session, oldest first.
    pub fn recent(&self, session_id: i64, limit: usize) -> Result<Vec<Message>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, emotion, created_at FROM chat_messages
             WHERE session_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![session_id, limit], row_to_message)?;
        let mut messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Number of turns stored for a session.
    pub fn count(&self, session_id: i64) -> Result<u64> {
        let conn = self.db.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// Emotion labels of a user's turns in `[from, to)`, most frequent first.
    pub fn emotion_counts(
        &self,
        user_id: i64,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<EmotionCount>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT m.emotion, COUNT(*) AS n FROM chat_messages m
             JOIN chat_sessions s ON s.id = m.session_id
             WHERE s.user_id = ?1 AND m.role = 'user' AND m.emotion IS NOT NULL
               AND m.created_at >= ?2 AND m.created_at < ?3
             GROUP BY m.emotion ORDER BY n DESC, m.emotion ASC",
        )?;
        let rows = stmt.query_map(params![user_id, db_time(&from), db_time(&to)], |row| {
            let count: i64 = row.get(1)?;
            Ok(EmotionCount {
                emotion: row.get(0)?,
                count: u32::try_from(count).unwrap_or(u32::MAX),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role_str: String = row.get(2)?;
    let role = Role::from_db(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            Box::new(CompanionError::Validation(format!("unknown role `{role_str}`"))),
        )
    })?;
    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role,
        content: row.get(3)?,
        emotion: row.get(4)?,
        created_at: row_time(row, 5)?,
    })
}
