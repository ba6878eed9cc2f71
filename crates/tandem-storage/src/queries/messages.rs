// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat message queries. Messages are append-only.

use rusqlite::{OptionalExtension, Row, params};
use tandem_core::{Message, SessionId, TandemError, UserId};

use crate::database::{Database, map_tr_err};

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        session_id: SessionId(row.get(1)?),
        sender_id: UserId(row.get(2)?),
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Insert a message.
pub async fn insert_message(db: &Database, msg: &Message) -> Result<(), TandemError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, session_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    msg.id,
                    msg.session_id.as_str(),
                    msg.sender_id.as_str(),
                    msg.content,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All messages of a session, oldest first.
pub async fn get_messages(db: &Database, session: &SessionId) -> Result<Vec<Message>, TandemError> {
    let session = session.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, sender_id, content, created_at
                 FROM messages WHERE session_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![session], message_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Number of messages `sender` wrote in `session`.
pub async fn count_messages(
    db: &Database,
    session: &SessionId,
    sender: &UserId,
) -> Result<u32, TandemError> {
    let session = session.to_string();
    let sender = sender.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE session_id = ?1 AND sender_id = ?2",
                params![session, sender],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// The most recent message in `session` written by someone other than `user`.
pub async fn last_message_from_other(
    db: &Database,
    session: &SessionId,
    user: &UserId,
) -> Result<Option<Message>, TandemError> {
    let session = session.to_string();
    let user = user.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, session_id, sender_id, content, created_at
                 FROM messages WHERE session_id = ?1 AND sender_id != ?2
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1",
                params![session, user],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::sessions;
    use crate::queries::test_support::{seed_user, setup_db};

    fn make_message(id: &str, session: &SessionId, sender: &UserId, at: &str) -> Message {
        Message {
            id: id.to_string(),
            session_id: session.clone(),
            sender_id: sender.clone(),
            content: format!("content of {id}"),
            created_at: at.to_string(),
        }
    }

    #[tokio::test]
    async fn messages_come_back_in_creation_order() {
        let (db, _dir) = setup_db().await;
        let a = seed_user(&db, "a").await;
        let b = seed_user(&db, "b").await;
        let s = sessions::create_session(&db, &a, &b).await.unwrap();

        insert_message(&db, &make_message("m2", &s.id, &b, "2026-01-01T10:00:02.000Z"))
            .await
            .unwrap();
        insert_message(&db, &make_message("m1", &s.id, &a, "2026-01-01T10:00:01.000Z"))
            .await
            .unwrap();
        insert_message(&db, &make_message("m3", &s.id, &a, "2026-01-01T10:00:02.000Z"))
            .await
            .unwrap();

        let ids: Vec<_> = get_messages(&db, &s.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
        assert_eq!(count_messages(&db, &s.id, &a).await.unwrap(), 2);
        assert_eq!(count_messages(&db, &s.id, &b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn last_message_from_other_skips_own_messages() {
        let (db, _dir) = setup_db().await;
        let a = seed_user(&db, "a").await;
        let b = seed_user(&db, "b").await;
        let s = sessions::create_session(&db, &a, &b).await.unwrap();

        assert!(last_message_from_other(&db, &s.id, &a).await.unwrap().is_none());

        insert_message(&db, &make_message("b1", &s.id, &b, "2026-01-01T10:00:00.000Z"))
            .await
            .unwrap();
        insert_message(&db, &make_message("b2", &s.id, &b, "2026-01-01T10:00:05.000Z"))
            .await
            .unwrap();
        insert_message(&db, &make_message("a1", &s.id, &a, "2026-01-01T10:00:09.000Z"))
            .await
            .unwrap();

        let last = last_message_from_other(&db, &s.id, &a).await.unwrap().unwrap();
        assert_eq!(last.id, "b2");
        let last = last_message_from_other(&db, &s.id, &b).await.unwrap().unwrap();
        assert_eq!(last.id, "a1");
    }
}
