// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Behavior event log.

use rusqlite::params;
use tandem_core::{BehaviorEvent, SessionActivity, SessionId, TandemError, UserId};

use crate::database::{Database, map_tr_err};

/// Append a behavior event.
pub async fn insert_event(db: &Database, event: &BehaviorEvent) -> Result<(), TandemError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO behavior_events (user_id, session_id, event_type, reply_latency_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.user_id.as_str(),
                    event.session_id.as_str(),
                    event.event_type.to_string(),
                    event.reply_latency_ms,
                    event.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Summarize one user's events in one session.
pub async fn session_event_summary(
    db: &Database,
    user: &UserId,
    session: &SessionId,
) -> Result<SessionActivity, TandemError> {
    let user = user.to_string();
    let session = session.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT
                    COALESCE(SUM(CASE WHEN event_type = 'reply' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN event_type = 'reply'
                                      THEN COALESCE(reply_latency_ms, 0.0) ELSE 0.0 END), 0.0),
                    COALESCE(SUM(CASE WHEN event_type = 'no_reply' THEN 1 ELSE 0 END), 0),
                    COALESCE(MAX(CASE WHEN event_type = 'end_chat' THEN 1 ELSE 0 END), 0)
                 FROM behavior_events
                 WHERE user_id = ?1 AND session_id = ?2",
                params![user, session],
                |row| {
                    Ok(SessionActivity {
                        message_count: 0,
                        reply_count: row.get(0)?,
                        total_reply_latency_ms: row.get(1)?,
                        no_reply_count: row.get(2)?,
                        ended_clean: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
        })
        .await
        .map_err(map_tr_err)
}
