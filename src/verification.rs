//! Expiring one-time verification codes.
//!
//! Each key (e.g. a phone number) holds one code with an expiry timestamp.
//! Verification marks the row; consumption removes it. A key accepts at
//! most [`MAX_VERIFY_ATTEMPTS`] wrong guesses per issued code. Expired rows are
//! deleted by [`VerificationLedger::sweep_expired`], which the periodic
//! sweep runner calls on the same clock as alarm delivery.

use chrono::{Duration, NaiveDateTime};
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

use crate::error::{CompanionError, Result};
use crate::store::Database;
use crate::store::types::{db_time, row_time};

/// Default lifetime of an issued code.
pub const DEFAULT_CODE_TTL_MINUTES: i64 = 5;

/// Wrong guesses allowed before a code stops verifying.
pub const MAX_VERIFY_ATTEMPTS: i64 = 5;

#[derive(Debug, Clone)]
pub struct VerificationLedger {
    db: Database,
}

impl VerificationLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store `code` for `key`, replacing any earlier code.
    pub fn issue(&self, key: &str, code: &str, now: NaiveDateTime, ttl: Duration) -> Result<NaiveDateTime> {
        if key.trim().is_empty() || code.trim().is_empty() {
            return Err(CompanionError::Validation("verification key and code are required".into()));
        }
        let expires_at = now + ttl;
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO verifications (key, code, verified, attempts, expires_at)
             VALUES (?1, ?2, 0, 0, ?3)
             ON CONFLICT(key) DO UPDATE SET code = excluded.code, verified = 0, attempts = 0,
                                            expires_at = excluded.expires_at",
            params![key, code, db_time(&expires_at)],
        )?;
        debug!(key, "verification code issued");
        Ok(expires_at)
    }

    /// Check `code`; on a match with an unexpired row the key becomes verified.
    ///
    /// A miss counts against the key. Once [`MAX_VERIFY_ATTEMPTS`] misses are
    /// recorded even the right code is refused until a new one is issued.
    pub fn verify(&self, key: &str, code: &str, now: NaiveDateTime) -> Result<bool> {
        let conn = self.db.lock()?;
        let now = db_time(&now);
        let changed = conn.execute(
            "UPDATE verifications SET verified = 1
             WHERE key = ?1 AND code = ?2 AND expires_at > ?3 AND attempts < ?4",
            params![key, code, now, MAX_VERIFY_ATTEMPTS],
        )?;
        if changed == 1 {
            return Ok(true);
        }
        let counted = conn.execute(
            "UPDATE verifications SET attempts = attempts + 1
             WHERE key = ?1 AND expires_at > ?2 AND attempts < ?3",
            params![key, now, MAX_VERIFY_ATTEMPTS],
        )?;
        if counted == 1 {
            debug!(key, "verification attempt rejected");
        }
        Ok(false)
    }

    /// Whether `key` was verified and has not expired.
    pub fn is_verified(&self, key: &str, now: NaiveDateTime) -> Result<bool> {
        let conn = self.db.lock()?;
        let row = conn
            .query_row(
                "SELECT verified, expires_at FROM verifications WHERE key = ?1",
                params![key],
                |row| Ok((row.get::<_, i64>(0)? != 0, row_time(row, 1)?)),
            )
            .optional()?;
        Ok(matches!(row, Some((true, expires_at)) if expires_at > now))
    }

    /// Remove `key` once it has been used. Returns whether a row existed.
    pub fn consume(&self, key: &str) -> Result<bool> {
        let conn = self.db.lock()?;
        let removed = conn.execute("DELETE FROM verifications WHERE key = ?1", params![key])?;
        Ok(removed == 1)
    }

    /// Delete every row whose expiry is at or before `now`.
    pub fn sweep_expired(&self, now: NaiveDateTime) -> Result<usize> {
        let conn = self.db.lock()?;
        let removed = conn.execute(
            "DELETE FROM verifications WHERE expires_at <= ?1",
            params![db_time(&now)],
        )?;
        if removed > 0 {
            info!(removed, "expired verification codes swept");
        }
        Ok(removed)
    }
}
