// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat session operations shared by the WebSocket loops and HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use tandem_core::types::{format_timestamp, parse_timestamp};
use tandem_core::{ChatSession, ChatStore, Message, SessionId, SessionStatus, TandemError, UserId};
use tandem_scoring::ScoringEngine;

use crate::frame::{ChatFrame, InboundFrame, is_server_only, message_types};
use crate::hub::HubHandle;

/// Persists frames, tracks replies, and relays through the hub.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    scoring: ScoringEngine,
    hub: HubHandle,
    reply_window: Duration,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        scoring: ScoringEngine,
        hub: HubHandle,
        reply_window: Duration,
    ) -> Self {
        Self {
            store,
            scoring,
            hub,
            reply_window,
        }
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// The session, if `user` takes part in it.
    pub async fn authorize(
        &self,
        session_id: &SessionId,
        user: &UserId,
    ) -> Result<ChatSession, TandemError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| TandemError::SessionNotFound(session_id.to_string()))?;
        if !session.has_participant(user) {
            return Err(TandemError::Forbidden(format!(
                "{user} is not part of session {session_id}"
            )));
        }
        Ok(session)
    }

    /// Like [`authorize`](Self::authorize), but the session must still be active.
    pub async fn authorize_live(
        &self,
        session_id: &SessionId,
        user: &UserId,
    ) -> Result<ChatSession, TandemError> {
        let session = self.authorize(session_id, user).await?;
        if session.status.is_terminal() {
            return Err(TandemError::SessionNotFound(format!(
                "{session_id} is no longer active"
            )));
        }
        Ok(session)
    }

    /// Message history for a participant, oldest first.
    pub async fn history(
        &self,
        session_id: &SessionId,
        user: &UserId,
    ) -> Result<Vec<Message>, TandemError> {
        self.authorize(session_id, user).await?;
        self.store.get_messages(session_id).await
    }

    /// Decode, tag, and relay one client frame.
    ///
    /// Malformed and server-only frames are dropped and `None` is returned. `message` frames
    /// are persisted and checked for reply latency first; every other type is
    /// relayed as-is. Persistence failures are logged and do not stop relay.
    pub async fn handle_frame(
        &self,
        session_id: &SessionId,
        sender: &UserId,
        raw: &str,
    ) -> Option<ChatFrame> {
        let inbound: InboundFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(session_id = %session_id, user_id = %sender, error = %e, "dropping malformed frame");
                return None;
            }
        };
        if is_server_only(&inbound.kind) {
            debug!(session_id = %session_id, user_id = %sender, kind = %inbound.kind, "dropping server-only frame");
            return None;
        }

        let now = Utc::now();
        let mut frame = ChatFrame::new(
            &inbound.kind,
            inbound.content,
            session_id.clone(),
            sender.clone(),
        );

        if frame.kind == message_types::MESSAGE {
            let content = frame.content.clone().unwrap_or_default();
            self.track_reply(session_id, sender, now).await;
            let message = Message {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: session_id.clone(),
                sender_id: sender.clone(),
                content: content.clone(),
                created_at: format_timestamp(now),
            };
            if let Err(e) = self.store.insert_message(&message).await {
                warn!(session_id = %session_id, user_id = %sender, error = %e, "failed to persist message");
            }
            frame.content = Some(content);
        }

        if let Err(e) = self
            .hub
            .broadcast(session_id.clone(), sender.clone(), frame.to_json())
            .await
        {
            warn!(session_id = %session_id, error = %e, "broadcast failed");
        }
        Some(frame)
    }

    /// Record a reply if the partner's latest message is recent enough.
    async fn track_reply(&self, session_id: &SessionId, sender: &UserId, now: chrono::DateTime<Utc>) {
        let last = match self.store.last_message_from_other(session_id, sender).await {
            Ok(Some(last)) => last,
            Ok(None) => return,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "reply lookup failed");
                return;
            }
        };
        let Some(previous) = parse_timestamp(&last.created_at) else {
            return;
        };
        if let Some(latency_ms) = reply_latency_ms(now - previous, self.reply_window) {
            self.scoring.record_reply(sender, session_id, latency_ms).await;
        }
    }

    /// End an active session on behalf of a participant.
    ///
    /// Records the ender's clean exit, scores both participants, and tells
    /// every connected client the chat is over.
    pub async fn end_chat(&self, session_id: &SessionId, user: &UserId) -> Result<(), TandemError> {
        let session = self.authorize_live(session_id, user).await?;
        let ended = self
            .store
            .end_session(session_id, SessionStatus::EndedByUser, Some(user))
            .await?;
        if !ended {
            return Err(TandemError::SessionNotFound(format!(
                "{session_id} is no longer active"
            )));
        }

        self.scoring.record_end_chat(user, session_id).await;
        for participant in session.participants() {
            self.scoring.compute_session_score(participant, session_id).await;
        }

        let frame = ChatFrame::new(
            message_types::CHAT_ENDED,
            None,
            session_id.clone(),
            user.clone(),
        );
        if let Err(e) = self
            .hub
            .broadcast(session_id.clone(), user.clone(), frame.to_json())
            .await
        {
            warn!(session_id = %session_id, error = %e, "failed to announce chat end");
        }
        Ok(())
    }
}

/// Latency of a reply sent `gap` after the partner's message. Only gaps that
/// are positive and shorter than `window` count.
fn reply_latency_ms(gap: chrono::TimeDelta, window: Duration) -> Option<f64> {
    let gap = gap.to_std().ok().filter(|gap| !gap.is_zero() && *gap < window)?;
    Some(gap.as_secs_f64() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn replies_inside_the_window_count() {
        assert_eq!(reply_latency_ms(TimeDelta::milliseconds(1500), HOUR), Some(1500.0));
        assert_eq!(
            reply_latency_ms(TimeDelta::minutes(59), HOUR),
            Some(59.0 * 60.0 * 1000.0)
        );
    }

    #[test]
    fn zero_and_negative_gaps_are_ignored() {
        assert_eq!(reply_latency_ms(TimeDelta::zero(), HOUR), None);
        assert_eq!(reply_latency_ms(TimeDelta::milliseconds(-250), HOUR), None);
    }

    #[test]
    fn window_bound_is_exclusive() {
        assert_eq!(reply_latency_ms(TimeDelta::hours(1), HOUR), None);
        assert_eq!(reply_latency_ms(TimeDelta::hours(2), HOUR), None);
        assert!(reply_latency_ms(TimeDelta::seconds(3599), HOUR).is_some());
    }
}
