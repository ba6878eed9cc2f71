// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily match markers kept in the shared database.
//!
//! Rows carry their own expiry; an expired row is treated as absent and is
//! overwritten by the next claim.

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rusqlite::{OptionalExtension, params};
use tandem_core::types::{format_timestamp, now_timestamp};
use tandem_core::{SessionId, TandemError, UserId};

use crate::database::{Database, map_tr_err};

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Claim `(user, day)` for `session` unless a live marker exists.
pub async fn try_mark(
    db: &Database,
    user: &UserId,
    day: NaiveDate,
    session: &SessionId,
    ttl: Duration,
) -> Result<bool, TandemError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| TandemError::Internal(format!("marker ttl out of range: {e}")))?;
    let now = Utc::now();
    let expires_at = format_timestamp(now + ttl);
    let now = format_timestamp(now);
    let user = user.to_string();
    let session = session.to_string();
    let day = day_key(day);
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO daily_markers (user_id, day, session_id, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, day) DO UPDATE SET
                    session_id = excluded.session_id,
                    expires_at = excluded.expires_at
                 WHERE daily_markers.expires_at <= ?5",
                params![user, day, session, expires_at, now],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(changed == 1)
}

/// The live marker for `(user, day)`, if any.
pub async fn get_marker(
    db: &Database,
    user: &UserId,
    day: NaiveDate,
) -> Result<Option<SessionId>, TandemError> {
    let user = user.to_string();
    let day = day_key(day);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT session_id FROM daily_markers
                 WHERE user_id = ?1 AND day = ?2 AND expires_at > ?3",
                params![user, day, now_timestamp()],
                |row| row.get(0).map(SessionId),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Delete the marker only if it still points at `session`.
pub async fn clear_marker(
    db: &Database,
    user: &UserId,
    day: NaiveDate,
    session: &SessionId,
) -> Result<(), TandemError> {
    let user = user.to_string();
    let day = day_key(day);
    let session = session.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM daily_markers WHERE user_id = ?1 AND day = ?2 AND session_id = ?3",
                params![user, day, session],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Remove expired markers, returning how many were deleted.
pub async fn purge_expired(db: &Database) -> Result<u64, TandemError> {
    let removed = db
        .connection()
        .call(|conn| {
            conn.execute(
                "DELETE FROM daily_markers WHERE expires_at <= ?1",
                params![now_timestamp()],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(removed as u64)
}
