//! SQLite DDL for the companion database.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

/// Current schema version stamped into `schema_meta`.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL. Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
///
/// Timestamps are local wall-clock `TEXT` in `YYYY-MM-DDTHH:MM:SS`, which
/// sorts lexicographically in time order.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Elders (`member`) and guardians linked to one elder.
CREATE TABLE IF NOT EXISTS users (
    id              INTEGER PRIMARY KEY,
    display_name    TEXT NOT NULL,
    role            TEXT NOT NULL,          -- member | guardian
    linked_elder_id INTEGER,
    alarm_enabled   INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_sessions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL,
    region_code TEXT NOT NULL DEFAULT 'std',
    title       TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON chat_sessions(user_id, created_at);

CREATE TABLE IF NOT EXISTS chat_messages (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
    role       TEXT NOT NULL,               -- user | assistant | system
    content    TEXT NOT NULL,
    emotion    TEXT,                        -- user turns only
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_session ON chat_messages(session_id, created_at, id);

CREATE TABLE IF NOT EXISTS schedule_events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id      INTEGER NOT NULL,
    title         TEXT NOT NULL,
    description   TEXT,
    location      TEXT,
    start_at      TEXT NOT NULL,
    end_at        TEXT NOT NULL,
    all_day       INTEGER NOT NULL DEFAULT 0,
    repeat_kind   TEXT NOT NULL DEFAULT 'none',
    priority      TEXT NOT NULL DEFAULT 'medium',
    alarm_minutes INTEGER,
    alarm_at      TEXT,
    alarm_sent    INTEGER NOT NULL DEFAULT 0,
    completed     INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_owner_start ON schedule_events(owner_id, start_at);
CREATE INDEX IF NOT EXISTS idx_events_due         ON schedule_events(alarm_sent, alarm_at);

-- Short-lived verification codes, swept by expiry.
CREATE TABLE IF NOT EXISTS verifications (
    key        TEXT PRIMARY KEY,
    code       TEXT NOT NULL,
    verified   INTEGER NOT NULL DEFAULT 0,
    attempts   INTEGER NOT NULL DEFAULT 0,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_verifications_expiry ON verifications(expires_at);
"#;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times. Inserts the current schema version into
/// `schema_meta` if not already present.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Read the current schema version, `None` if it was never stamped.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}
