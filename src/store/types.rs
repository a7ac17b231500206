//! Row types and conversion helpers shared by the SQLite-backed stores.

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};

/// Storage format for every timestamp column.
pub(crate) const DB_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format a timestamp for storage (sub-second precision is dropped).
pub(crate) fn db_time(at: &NaiveDateTime) -> String {
    at.format(DB_TIME_FORMAT).to_string()
}

/// Read a timestamp column.
pub(crate) fn row_time(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DB_TIME_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable timestamp column.
pub(crate) fn row_opt_time(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        NaiveDateTime::parse_from_str(&s, DB_TIME_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Stable lowercase name, as stored and as sent to the language model.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub(crate) fn from_db(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// One conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub region_code: String,
    /// Set at most once, after the first exchange.
    pub title: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// One immutable turn in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub session_id: i64,
    pub role: Role,
    pub content: String,
    /// Canonical emotion label; only present on user turns.
    pub emotion: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Normalise a region code; blank input yields `None`.
pub fn normalize_region(code: Option<&str>) -> Option<String> {
    code.map(|c| c.trim().to_lowercase()).filter(|c| !c.is_empty())
}
