// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engagement score records.

use rusqlite::{OptionalExtension, params};
use tandem_core::types::now_timestamp;
use tandem_core::{DEFAULT_SCORE, EngagementRecord, MAX_SCORE, MIN_SCORE, ScoreUpdate, TandemError, UserId};

use crate::database::{Database, map_tr_err};

/// Get a user's engagement record.
pub async fn get_engagement(
    db: &Database,
    user: &UserId,
) -> Result<Option<EngagementRecord>, TandemError> {
    let user = user.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT user_id, score, reply_avg_ms, total_chats, total_messages,
                        no_reply_count, updated_at
                 FROM engagement_scores WHERE user_id = ?1",
                params![user],
                |row| {
                    Ok(EngagementRecord {
                        user_id: UserId(row.get(0)?),
                        score: row.get(1)?,
                        reply_avg_ms: row.get(2)?,
                        total_chats: row.get(3)?,
                        total_messages: row.get(4)?,
                        no_reply_count: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a score delta for one user and session.
///
/// The (user, session) pair is claimed in `scored_sessions` first; a pair
/// that was already claimed leaves the record untouched and yields `None`.
/// A missing row starts at the default score. The result is clamped to the
/// score range inside SQLite, so concurrent updates never observe an
/// out-of-range intermediate.
pub async fn apply_score_update(
    db: &Database,
    update: &ScoreUpdate,
) -> Result<Option<f64>, TandemError> {
    let update = update.clone();
    db.connection()
        .call(move |conn| {
            let now = now_timestamp();
            let tx = conn.transaction()?;

            let claimed = tx.execute(
                "INSERT OR IGNORE INTO scored_sessions (user_id, session_id, scored_at)
                 VALUES (?1, ?2, ?3)",
                params![update.user_id.as_str(), update.session_id.as_str(), now],
            )?;
            if claimed == 0 {
                return Ok(None);
            }

            let score: f64 = tx.query_row(
                "INSERT INTO engagement_scores
                    (user_id, score, reply_avg_ms, total_chats, total_messages, no_reply_count, updated_at)
                 VALUES (?1, MAX(?7, MIN(?8, ?9 + ?2)), COALESCE(?3, 0.0), 1, ?4, ?5, ?6)
                 ON CONFLICT(user_id) DO UPDATE SET
                    score = MAX(?7, MIN(?8, engagement_scores.score + ?2)),
                    reply_avg_ms = COALESCE(?3, engagement_scores.reply_avg_ms),
                    total_chats = engagement_scores.total_chats + 1,
                    total_messages = engagement_scores.total_messages + ?4,
                    no_reply_count = engagement_scores.no_reply_count + ?5,
                    updated_at = ?6
                 RETURNING score",
                params![
                    update.user_id.as_str(),
                    update.delta,
                    update.reply_avg_ms,
                    update.messages,
                    update.no_replies,
                    now,
                    MIN_SCORE,
                    MAX_SCORE,
                    DEFAULT_SCORE,
                ],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok(Some(score))
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::setup_db;

    fn update(user: &str, session: &str, delta: f64) -> ScoreUpdate {
        ScoreUpdate {
            user_id: user.into(),
            session_id: session.into(),
            delta,
            messages: 3,
            no_replies: 0,
            reply_avg_ms: None,
        }
    }

    #[tokio::test]
    async fn first_update_starts_from_default() {
        let (db, _dir) = setup_db().await;
        let score = apply_score_update(&db, &update("a", "s1", 4.0)).await.unwrap();
        assert_eq!(score, Some(54.0));

        let record = get_engagement(&db, &"a".into()).await.unwrap().unwrap();
        assert_eq!(record.total_chats, 1);
        assert_eq!(record.total_messages, 3);
        assert_eq!(record.reply_avg_ms, 0.0);
    }

    #[tokio::test]
    async fn updates_accumulate_and_clamp() {
        let (db, _dir) = setup_db().await;
        apply_score_update(&db, &update("a", "s1", 40.0)).await.unwrap();
        let score = apply_score_update(&db, &update("a", "s2", 40.0)).await.unwrap();
        assert_eq!(score, Some(100.0));

        let score = apply_score_update(&db, &update("a", "s3", -250.0)).await.unwrap();
        assert_eq!(score, Some(0.0));

        let record = get_engagement(&db, &"a".into()).await.unwrap().unwrap();
        assert_eq!(record.total_chats, 3);
        assert_eq!(record.total_messages, 9);
    }

    #[tokio::test]
    async fn reply_average_replaced_only_when_present() {
        let (db, _dir) = setup_db().await;
        let mut first = update("a", "s1", 1.0);
        first.reply_avg_ms = Some(2000.0);
        apply_score_update(&db, &first).await.unwrap();

        let mut second = update("a", "s2", 1.0);
        second.no_replies = 2;
        apply_score_update(&db, &second).await.unwrap();

        let record = get_engagement(&db, &"a".into()).await.unwrap().unwrap();
        assert_eq!(record.reply_avg_ms, 2000.0);
        assert_eq!(record.no_reply_count, 2);
    }

    #[tokio::test]
    async fn each_session_is_applied_once_per_user() {
        let (db, _dir) = setup_db().await;
        assert_eq!(
            apply_score_update(&db, &update("a", "s1", 4.0)).await.unwrap(),
            Some(54.0)
        );
        assert_eq!(apply_score_update(&db, &update("a", "s1", 4.0)).await.unwrap(), None);

        let record = get_engagement(&db, &"a".into()).await.unwrap().unwrap();
        assert_eq!(record.score, 54.0);
        assert_eq!(record.total_chats, 1);
        assert_eq!(record.total_messages, 3);

        // The partner's claim on the same session is independent.
        assert_eq!(
            apply_score_update(&db, &update("b", "s1", -2.0)).await.unwrap(),
            Some(48.0)
        );
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_engagement(&db, &"nobody".into()).await.unwrap().is_none());
    }
}
