// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoring service over the persistent store.
//!
//! Scores are advisory. Every write failure is logged and swallowed so chat
//! and matching never stall on scoring.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use tandem_core::{
    BehaviorEvent, ChatStore, DEFAULT_SCORE, EventType, ScoreUpdate, SessionId, TandemError,
    UserId,
};

use crate::delta::session_delta;

/// Records behavior events and recomputes engagement scores.
#[derive(Clone)]
pub struct ScoringEngine {
    store: Arc<dyn ChatStore>,
}

impl ScoringEngine {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Record that `user` replied after `latency_ms`.
    pub async fn record_reply(&self, user: &UserId, session: &SessionId, latency_ms: f64) {
        self.record(BehaviorEvent::reply(user.clone(), session.clone(), latency_ms))
            .await;
    }

    /// Record that `user` never replied in `session`.
    pub async fn record_no_reply(&self, user: &UserId, session: &SessionId) {
        self.record(BehaviorEvent::new(
            user.clone(),
            session.clone(),
            EventType::NoReply,
        ))
        .await;
    }

    /// Record that `user` ended `session` themselves.
    pub async fn record_end_chat(&self, user: &UserId, session: &SessionId) {
        self.record(BehaviorEvent::new(
            user.clone(),
            session.clone(),
            EventType::EndChat,
        ))
        .await;
    }

    async fn record(&self, event: BehaviorEvent) {
        if let Err(e) = self.store.insert_event(&event).await {
            warn!(
                user_id = %event.user_id,
                session_id = %event.session_id,
                event_type = %event.event_type,
                error = %e,
                "failed to record behavior event"
            );
        }
    }

    /// Fold one session's activity into `user`'s score.
    ///
    /// Returns the new score, or `None` if the update failed. A session that
    /// was already scored for `user` is not applied again; the current score
    /// is returned instead.
    pub async fn compute_session_score(&self, user: &UserId, session: &SessionId) -> Option<f64> {
        match self.try_compute(user, session).await {
            Ok(Some(score)) => Some(score),
            Ok(None) => {
                debug!(user_id = %user, session_id = %session, "session already scored");
                Some(self.get_score(user).await)
            }
            Err(e) => {
                warn!(user_id = %user, session_id = %session, error = %e, "score update failed");
                None
            }
        }
    }

    async fn try_compute(
        &self,
        user: &UserId,
        session: &SessionId,
    ) -> Result<Option<f64>, TandemError> {
        let mut activity = self.store.session_event_summary(user, session).await?;
        activity.message_count = self.store.count_messages(session, user).await?;

        let history = if activity.reply_count > 0 {
            self.store
                .get_engagement(user)
                .await?
                .map(|record| record.reply_avg_ms)
        } else {
            None
        };

        let delta = session_delta(&activity, history);
        let score = self
            .store
            .apply_score_update(&ScoreUpdate {
                user_id: user.clone(),
                session_id: session.clone(),
                delta: delta.total(),
                messages: activity.message_count,
                no_replies: activity.no_reply_count,
                reply_avg_ms: delta.reply_avg_ms,
            })
            .await?;

        if let Some(score) = score {
            debug!(
                user_id = %user,
                session_id = %session,
                delta = delta.total(),
                score,
                "session scored"
            );
        }
        Ok(score)
    }

    /// Record a no-reply for every participant who sent nothing in `session`.
    pub async fn apply_inactivity_penalty(&self, session: &SessionId) {
        let chat = match self.store.get_session(session).await {
            Ok(Some(chat)) => chat,
            Ok(None) => {
                debug!(session_id = %session, "inactivity check on unknown session");
                return;
            }
            Err(e) => {
                warn!(session_id = %session, error = %e, "inactivity check failed");
                return;
            }
        };

        for user in chat.participants() {
            match self.store.count_messages(session, user).await {
                Ok(0) => self.record_no_reply(user, session).await,
                Ok(_) => {}
                Err(e) => {
                    warn!(user_id = %user, session_id = %session, error = %e, "message count failed");
                }
            }
        }
    }

    /// Current score, or the default when there is no record or the read fails.
    pub async fn get_score(&self, user: &UserId) -> f64 {
        match self.store.get_engagement(user).await {
            Ok(Some(record)) => record.score,
            Ok(None) => DEFAULT_SCORE,
            Err(e) => {
                warn!(user_id = %user, error = %e, "score read failed, using default");
                DEFAULT_SCORE
            }
        }
    }

    /// Score both participants of every session that ended on `day`, skipping
    /// any participant already scored for it. Returns the number of sessions
    /// with at least one new score.
    pub async fn scheduled_score_update(&self, day: NaiveDate) -> usize {
        let sessions = match self.store.sessions_ended_on(day).await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(%day, error = %e, "scheduled score update query failed");
                return 0;
            }
        };
        let mut rescored = 0;
        for chat in &sessions {
            let mut applied = false;
            for user in chat.participants() {
                match self.try_compute(user, &chat.id).await {
                    Ok(score) => applied |= score.is_some(),
                    Err(e) => {
                        warn!(user_id = %user, session_id = %chat.id, error = %e, "score update failed");
                    }
                }
            }
            if applied {
                rescored += 1;
            }
        }
        debug!(%day, sessions = sessions.len(), rescored, "scheduled score update finished");
        rescored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::Message;
    use tandem_core::types::now_timestamp;
    use tandem_storage::{Database, SqliteStore};
    use tracing_test::traced_test;

    async fn setup() -> (ScoringEngine, SqliteStore, SessionId, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        let store = SqliteStore::new(db);
        store.upsert_user(&"a".into(), "A").await.unwrap();
        store.upsert_user(&"b".into(), "B").await.unwrap();
        let session = store.create_session(&"a".into(), &"b".into()).await.unwrap();
        let engine = ScoringEngine::new(Arc::new(store.clone()));
        (engine, store, session.id, dir)
    }

    async fn say(store: &SqliteStore, session: &SessionId, sender: &str, n: usize) {
        for i in 0..n {
            store
                .insert_message(&Message {
                    id: format!("{sender}-{i}"),
                    session_id: session.clone(),
                    sender_id: sender.into(),
                    content: "hi".into(),
                    created_at: now_timestamp(),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn unknown_user_scores_default() {
        let (engine, _store, _session, _dir) = setup().await;
        assert_eq!(engine.get_score(&"nobody".into()).await, DEFAULT_SCORE);
    }

    #[tokio::test]
    async fn inactivity_penalizes_only_silent_participants() {
        let (engine, store, session, _dir) = setup().await;
        say(&store, &session, "a", 1).await;

        engine.apply_inactivity_penalty(&session).await;

        let a = store.session_event_summary(&"a".into(), &session).await.unwrap();
        let b = store.session_event_summary(&"b".into(), &session).await.unwrap();
        assert_eq!(a.no_reply_count, 0);
        assert_eq!(b.no_reply_count, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn read_failures_fall_back_to_default() {
        let (engine, store, _session, _dir) = setup().await;
        store.database().clone().close().await.unwrap();

        assert_eq!(engine.get_score(&"a".into()).await, DEFAULT_SCORE);
        assert!(logs_contain("score read failed"));
        assert_eq!(engine.compute_session_score(&"a".into(), &"s".into()).await, None);
        assert!(logs_contain("score update failed"));
    }
}
