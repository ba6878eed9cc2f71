// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the matching, scoring, and chat subsystems.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::TandemError;

/// Engagement score assigned to users without a score record.
pub const DEFAULT_SCORE: f64 = 50.0;

/// Lower bound of the engagement score.
pub const MIN_SCORE: f64 = 0.0;

/// Upper bound of the engagement score.
pub const MAX_SCORE: f64 = 100.0;

/// Timestamp layout used for every persisted timestamp. Lexicographic order
/// matches chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format a UTC instant in the persisted timestamp layout.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Current time in the persisted timestamp layout.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse a persisted (or any RFC 3339) timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Unique identifier for a user, issued by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Unique identifier for a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(UserId);
string_id!(SessionId);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// A point on the globe, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    /// Build a location, rejecting coordinates outside [-90, 90] x [-180, 180].
    pub fn new(lat: f64, lon: f64) -> Result<Self, TandemError> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        if valid {
            Ok(Self { lat, lon })
        } else {
            Err(TandemError::InvalidLocation { lat, lon })
        }
    }
}

/// The slice of the external user profile the core reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    /// Absent location excludes the user from matching.
    pub location: Option<Location>,
    pub created_at: String,
}

/// A user eligible for pairing today, joined with their current score.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub user_id: UserId,
    pub location: Location,
    pub score: f64,
}

/// Lifecycle state of a chat session. Terminal states are final.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    EndedByUser,
    EndedBySystem,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

/// A pairing of two users for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub status: SessionStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub ended_by: Option<UserId>,
}

impl ChatSession {
    pub fn has_participant(&self, user: &UserId) -> bool {
        &self.user1_id == user || &self.user2_id == user
    }

    /// The other participant, or `None` if `user` is not part of this session.
    pub fn partner_of(&self, user: &UserId) -> Option<&UserId> {
        if &self.user1_id == user {
            Some(&self.user2_id)
        } else if &self.user2_id == user {
            Some(&self.user1_id)
        } else {
            None
        }
    }

    pub fn participants(&self) -> [&UserId; 2] {
        [&self.user1_id, &self.user2_id]
    }
}

/// A persisted chat message. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: SessionId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: String,
}

/// Kinds of behavior events consumed by the scoring engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Reply,
    NoReply,
    EndChat,
}

/// Append-only audit record of user behavior in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub event_type: EventType,
    /// Only set for [`EventType::Reply`].
    pub reply_latency_ms: Option<f64>,
    pub created_at: String,
}

impl BehaviorEvent {
    pub fn new(user_id: UserId, session_id: SessionId, event_type: EventType) -> Self {
        Self {
            user_id,
            session_id,
            event_type,
            reply_latency_ms: None,
            created_at: now_timestamp(),
        }
    }

    pub fn reply(user_id: UserId, session_id: SessionId, latency_ms: f64) -> Self {
        Self {
            reply_latency_ms: Some(latency_ms),
            ..Self::new(user_id, session_id, EventType::Reply)
        }
    }
}

/// Aggregated behavior of one user within one session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionActivity {
    pub message_count: u32,
    pub reply_count: u32,
    pub total_reply_latency_ms: f64,
    pub no_reply_count: u32,
    pub ended_clean: bool,
}

/// One row of per-user engagement state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub user_id: UserId,
    pub score: f64,
    /// Exponential moving average of reply latency; `0.0` means no history.
    pub reply_avg_ms: f64,
    pub total_chats: i64,
    pub total_messages: i64,
    pub no_reply_count: i64,
    pub updated_at: String,
}

/// A score mutation applied atomically by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub user_id: UserId,
    /// Session whose activity this update folds in. Applied at most once.
    pub session_id: SessionId,
    pub delta: f64,
    pub messages: u32,
    pub no_replies: u32,
    /// New reply-latency average, when this session had replies.
    pub reply_avg_ms: Option<f64>,
}

/// Cross-instance relay unit. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub session_id: SessionId,
    /// Serialized chat frame, delivered verbatim to clients.
    pub data: String,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_instance_id: Option<String>,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the role an adapter plays.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Markers,
    Bus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn session() -> ChatSession {
        ChatSession {
            id: SessionId::from("s-1"),
            user1_id: UserId::from("alice"),
            user2_id: UserId::from("bob"),
            status: SessionStatus::Active,
            started_at: "2026-01-01T20:00:00.000Z".into(),
            ended_at: None,
            ended_by: None,
        }
    }

    #[test]
    fn location_rejects_out_of_range() {
        assert!(Location::new(40.0, -74.0).is_ok());
        assert!(Location::new(90.0, 180.0).is_ok());
        assert!(matches!(
            Location::new(91.0, 0.0),
            Err(TandemError::InvalidLocation { .. })
        ));
        assert!(Location::new(0.0, -180.5).is_err());
        assert!(Location::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn partner_lookup() {
        let s = session();
        assert_eq!(s.partner_of(&"alice".into()), Some(&UserId::from("bob")));
        assert_eq!(s.partner_of(&"bob".into()), Some(&UserId::from("alice")));
        assert_eq!(s.partner_of(&"carol".into()), None);
        assert!(s.has_participant(&"bob".into()));
    }

    #[test]
    fn session_status_strings() {
        assert_eq!(SessionStatus::EndedByUser.to_string(), "ended_by_user");
        assert_eq!(
            SessionStatus::from_str("ended_by_system").unwrap(),
            SessionStatus::EndedBySystem
        );
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::EndedByUser.is_terminal());
    }

    #[test]
    fn event_type_strings() {
        assert_eq!(EventType::NoReply.to_string(), "no_reply");
        assert_eq!(EventType::from_str("end_chat").unwrap(), EventType::EndChat);
    }

    #[test]
    fn envelope_omits_missing_origin() {
        let env = Envelope {
            session_id: "s-1".into(),
            data: "{}".into(),
            sender_id: "alice".into(),
            origin_instance_id: None,
        };
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains("origin_instance_id"));
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn timestamps_sort_chronologically() {
        let a = parse_timestamp("2026-01-01T00:00:01.000Z").unwrap();
        let b = parse_timestamp("2026-01-01T00:00:02.500Z").unwrap();
        assert!(format_timestamp(a) < format_timestamp(b));
        assert_eq!((b - a).num_milliseconds(), 1500);
    }

    #[test]
    fn generated_session_ids_are_distinct() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }
}
