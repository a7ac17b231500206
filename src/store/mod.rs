//! SQLite persistence for sessions, messages, users, calendar events and
//! verification codes.
//!
//! A single [`Database`] handle owns the connection; the typed stores
//! ([`SessionStore`], [`MessageLog`], and the calendar/identity/verification
//! stores elsewhere in the crate) hold cheap clones of it.

mod messages;
pub(crate) mod schema;
mod sessions;
pub mod types;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::{CompanionError, Result};

pub use messages::{EmotionCount, MessageLog};
pub use sessions::SessionStore;
pub use types::{Message, Role, Session};

/// Shared SQLite connection.
///
/// Thread-safe via an internal `Mutex<Connection>`; all statements are
/// serialized, which also gives every multi-statement operation a single
/// writer.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open (or create) the database file at `path`, applying the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::apply_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Read the schema version stamp.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.lock()?;
        Ok(schema::read_schema_version(&conn)?)
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CompanionError::Lock(e.to_string()))
    }
}
