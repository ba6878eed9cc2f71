// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat session lifecycle queries.

use chrono::NaiveDate;
use rusqlite::{OptionalExtension, Row, params};
use tandem_core::clock::day_bounds;
use tandem_core::types::now_timestamp;
use tandem_core::{ChatSession, SessionId, SessionStatus, TandemError, UserId};

use crate::database::{Database, map_tr_err};
use crate::queries::parse_column;

const SESSION_COLUMNS: &str = "id, user1_id, user2_id, status, started_at, ended_at, ended_by";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSession> {
    Ok(ChatSession {
        id: SessionId(row.get(0)?),
        user1_id: UserId(row.get(1)?),
        user2_id: UserId(row.get(2)?),
        status: parse_column(3, row.get(3)?)?,
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
        ended_by: row.get::<_, Option<String>>(6)?.map(UserId),
    })
}

/// Insert a new active session between two users.
pub async fn create_session(
    db: &Database,
    user1: &UserId,
    user2: &UserId,
) -> Result<ChatSession, TandemError> {
    let session = ChatSession {
        id: SessionId::generate(),
        user1_id: user1.clone(),
        user2_id: user2.clone(),
        status: SessionStatus::Active,
        started_at: now_timestamp(),
        ended_at: None,
        ended_by: None,
    };
    let row = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO chat_sessions (id, user1_id, user2_id, status, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.id.as_str(),
                    row.user1_id.as_str(),
                    row.user2_id.as_str(),
                    row.status.to_string(),
                    row.started_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(session)
}

/// Delete a session row, along with anything attached to it.
pub async fn discard_session(db: &Database, id: &SessionId) -> Result<(), TandemError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM chat_sessions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a session by ID.
pub async fn get_session(db: &Database, id: &SessionId) -> Result<Option<ChatSession>, TandemError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?1"),
                params![id],
                session_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Latest session involving `user` that started on `day`.
pub async fn session_started_on(
    db: &Database,
    user: &UserId,
    day: NaiveDate,
) -> Result<Option<ChatSession>, TandemError> {
    let user = user.to_string();
    let (start, end) = day_bounds(day);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM chat_sessions
                     WHERE (user1_id = ?1 OR user2_id = ?1)
                       AND started_at >= ?2 AND started_at < ?3
                     ORDER BY started_at DESC, rowid DESC
                     LIMIT 1"
                ),
                params![user, start, end],
                session_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Move an active session to a terminal status. Returns whether a row changed.
pub async fn end_session(
    db: &Database,
    id: &SessionId,
    status: SessionStatus,
    ended_by: Option<&UserId>,
) -> Result<bool, TandemError> {
    if !status.is_terminal() {
        return Err(TandemError::Internal(format!(
            "cannot end session {id} with non-terminal status {status}"
        )));
    }
    let id = id.to_string();
    let ended_by = ended_by.map(|u| u.to_string());
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE chat_sessions SET status = ?1, ended_at = ?2, ended_by = ?3
                 WHERE id = ?4 AND status = 'active'",
                params![status.to_string(), now_timestamp(), ended_by, id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(changed == 1)
}

/// End every active session as `ended_by_system` and return them.
pub async fn end_all_active(db: &Database) -> Result<Vec<ChatSession>, TandemError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "UPDATE chat_sessions SET status = 'ended_by_system', ended_at = ?1
                 WHERE status = 'active'
                 RETURNING {SESSION_COLUMNS}"
            ))?;
            let rows = stmt.query_map(params![now_timestamp()], session_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Sessions that reached a terminal status on `day`.
pub async fn sessions_ended_on(
    db: &Database,
    day: NaiveDate,
) -> Result<Vec<ChatSession>, TandemError> {
    let (start, end) = day_bounds(day);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM chat_sessions
                 WHERE ended_at >= ?1 AND ended_at < ?2
                 ORDER BY ended_at"
            ))?;
            let rows = stmt.query_map(params![start, end], session_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
