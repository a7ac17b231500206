//! User identity: effective-owner resolution and the global alarm preference.
//!
//! Elders (`member`) own their calendar. A guardian is linked to exactly one
//! elder and every calendar operation a guardian performs targets that
//! elder's data. Resolution happens once per request through
//! [`IdentityStore::effective_owner`].

use chrono::NaiveDateTime;
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CompanionError, Result};
use crate::store::Database;
use crate::store::types::db_time;

/// Account kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// The elder using the companion.
    Member,
    /// A family member or carer acting on behalf of one elder.
    Guardian,
}

impl UserRole {
    fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Guardian => "guardian",
        }
    }

    fn from_db(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "guardian" => Some(Self::Guardian),
            _ => None,
        }
    }
}

/// Stored user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub display_name: String,
    pub role: UserRole,
    pub linked_elder_id: Option<i64>,
    pub alarm_enabled: bool,
}

/// Narrow identity interface consumed by the pipeline and the alarm dispatcher.
pub trait IdentityStore: Send + Sync {
    /// The user id whose calendar an operation by `user_id` targets.
    fn effective_owner(&self, user_id: i64) -> Result<i64>;

    /// Global alarm gate of `user_id`.
    fn alarm_enabled(&self, user_id: i64) -> Result<bool>;

    /// Flip the global alarm gate of `user_id`.
    fn set_alarm_enabled(&self, user_id: i64, enabled: bool) -> Result<()>;
}

/// SQLite-backed [`IdentityStore`].
#[derive(Debug, Clone)]
pub struct SqliteIdentityStore {
    db: Database,
}

impl SqliteIdentityStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register an elder. Alarms start enabled.
    pub fn register_member(&self, id: i64, display_name: &str, now: NaiveDateTime) -> Result<()> {
        self.insert(id, display_name, UserRole::Member, None, now)
    }

    /// Register a guardian linked to `elder_id`, which must be a member.
    pub fn register_guardian(
        &self,
        id: i64,
        display_name: &str,
        elder_id: i64,
        now: NaiveDateTime,
    ) -> Result<()> {
        match self.get(elder_id)? {
            Some(elder) if elder.role == UserRole::Member => {}
            Some(_) => {
                return Err(CompanionError::Validation(format!(
                    "user {elder_id} is not an elder"
                )));
            }
            None => return Err(CompanionError::NotFound(format!("user {elder_id}"))),
        }
        self.insert(id, display_name, UserRole::Guardian, Some(elder_id), now)
    }

    fn insert(
        &self,
        id: i64,
        display_name: &str,
        role: UserRole,
        linked_elder_id: Option<i64>,
        now: NaiveDateTime,
    ) -> Result<()> {
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO users (id, display_name, role, linked_elder_id, alarm_enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![id, display_name, role.as_str(), linked_elder_id, db_time(&now)],
        )?;
        info!(user_id = id, role = role.as_str(), "user registered");
        Ok(())
    }

    /// Fetch a user row.
    pub fn get(&self, id: i64) -> Result<Option<UserRecord>> {
        let conn = self.db.lock()?;
        let row = conn
            .query_row(
                "SELECT id, display_name, role, linked_elder_id, alarm_enabled FROM users WHERE id = ?1",
                params![id],
                |row| {
                    let role: String = row.get(2)?;
                    let alarm: i64 = row.get(4)?;
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        role,
                        row.get::<_, Option<i64>>(3)?,
                        alarm != 0,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, display_name, role, linked_elder_id, alarm_enabled)| {
            let role = UserRole::from_db(&role)
                .ok_or_else(|| CompanionError::Validation(format!("unknown role `{role}`")))?;
            Ok(UserRecord {
                id,
                display_name,
                role,
                linked_elder_id,
                alarm_enabled,
            })
        })
        .transpose()
    }

    fn require(&self, id: i64) -> Result<UserRecord> {
        self.get(id)?
            .ok_or_else(|| CompanionError::NotFound(format!("user {id}")))
    }
}

impl IdentityStore for SqliteIdentityStore {
    fn effective_owner(&self, user_id: i64) -> Result<i64> {
        let user = self.require(user_id)?;
        match user.role {
            UserRole::Member => Ok(user.id),
            UserRole::Guardian => user.linked_elder_id.ok_or_else(|| {
                CompanionError::Unauthorized(format!("guardian {user_id} has no linked elder"))
            }),
        }
    }

    fn alarm_enabled(&self, user_id: i64) -> Result<bool> {
        Ok(self.require(user_id)?.alarm_enabled)
    }

    fn set_alarm_enabled(&self, user_id: i64, enabled: bool) -> Result<()> {
        let conn = self.db.lock()?;
        let changed = conn.execute(
            "UPDATE users SET alarm_enabled = ?1 WHERE id = ?2",
            params![enabled, user_id],
        )?;
        if changed == 0 {
            return Err(CompanionError::NotFound(format!("user {user_id}")));
        }
        info!(user_id, enabled, "alarm preference updated");
        Ok(())
    }
}
