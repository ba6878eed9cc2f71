// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent store trait for users, sessions, messages, behavior events,
//! and engagement scores.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::TandemError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    BehaviorEvent, Candidate, ChatSession, EngagementRecord, Location, Message, ScoreUpdate,
    SessionActivity, SessionId, SessionStatus, User, UserId,
};

/// Durable store shared by every instance of the service.
///
/// Calendar days are local-time days; implementations translate them to
/// UTC bounds before comparing against stored timestamps.
#[async_trait]
pub trait ChatStore: PluginAdapter {
    // --- users ---

    /// Creates the user if missing, otherwise refreshes the display name.
    async fn upsert_user(&self, id: &UserId, display_name: &str) -> Result<(), TandemError>;

    /// Sets the user's location. Fails with `UnknownUser` if the user is absent.
    async fn set_location(&self, id: &UserId, location: Location) -> Result<(), TandemError>;

    async fn get_user(&self, id: &UserId) -> Result<Option<User>, TandemError>;

    /// Users with a location and no session started on `day`, with their
    /// current score (default 50 when no score record exists).
    async fn list_unmatched_users(&self, day: NaiveDate) -> Result<Vec<Candidate>, TandemError>;

    // --- sessions ---

    /// Inserts a new `active` session and returns it.
    async fn create_session(&self, user1: &UserId, user2: &UserId)
    -> Result<ChatSession, TandemError>;

    /// Deletes a session that was never handed out (lost a marker race).
    async fn discard_session(&self, id: &SessionId) -> Result<(), TandemError>;

    async fn get_session(&self, id: &SessionId) -> Result<Option<ChatSession>, TandemError>;

    /// The most recent session involving `user` that started on `day`.
    async fn session_started_on(
        &self,
        user: &UserId,
        day: NaiveDate,
    ) -> Result<Option<ChatSession>, TandemError>;

    /// Moves an `active` session to a terminal status. Returns `false` when
    /// the session was missing or already ended.
    async fn end_session(
        &self,
        id: &SessionId,
        status: SessionStatus,
        ended_by: Option<&UserId>,
    ) -> Result<bool, TandemError>;

    /// Ends every still-active session as `ended_by_system`, returning them.
    async fn end_all_active(&self) -> Result<Vec<ChatSession>, TandemError>;

    async fn sessions_ended_on(&self, day: NaiveDate) -> Result<Vec<ChatSession>, TandemError>;

    // --- messages ---

    async fn insert_message(&self, message: &Message) -> Result<(), TandemError>;

    /// Messages of a session in creation order.
    async fn get_messages(&self, session: &SessionId) -> Result<Vec<Message>, TandemError>;

    async fn count_messages(&self, session: &SessionId, sender: &UserId)
    -> Result<u32, TandemError>;

    /// Most recent message in `session` sent by anyone other than `user`.
    async fn last_message_from_other(
        &self,
        session: &SessionId,
        user: &UserId,
    ) -> Result<Option<Message>, TandemError>;

    // --- behavior events ---

    async fn insert_event(&self, event: &BehaviorEvent) -> Result<(), TandemError>;

    /// Event-derived activity of `user` in `session`. `message_count` is left
    /// at zero; callers combine it with [`ChatStore::count_messages`].
    async fn session_event_summary(
        &self,
        user: &UserId,
        session: &SessionId,
    ) -> Result<SessionActivity, TandemError>;

    // --- engagement scores ---

    async fn get_engagement(&self, user: &UserId)
    -> Result<Option<EngagementRecord>, TandemError>;

    /// Applies a delta atomically: upserts the row (starting at 50), clamps
    /// to [0, 100], bumps lifetime counters, optionally replaces the reply
    /// average. Returns the new score, or `None` if this user and session
    /// were already scored.
    async fn apply_score_update(&self, update: &ScoreUpdate)
    -> Result<Option<f64>, TandemError>;
}
