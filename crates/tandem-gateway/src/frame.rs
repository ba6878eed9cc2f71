// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket frame protocol.
//!
//! Client -> Server (JSON):
//! ```json
//! {"type": "message", "content": "hey!"}
//! {"type": "typing"}
//! ```
//!
//! Server -> Client (JSON):
//! ```json
//! {"type": "message", "content": "hey!", "session_id": "...", "sender_id": "...", "timestamp": "..."}
//! {"type": "chat_ended", "session_id": "...", "sender_id": "...", "timestamp": "..."}
//! ```

use serde::{Deserialize, Serialize};

use tandem_core::{SessionId, UserId};

/// Frame type constants.
pub mod message_types {
    /// A chat message. The only persisted frame type.
    pub const MESSAGE: &str = "message";
    /// Typing indicator.
    pub const TYPING: &str = "typing";
    /// The session has ended; connections close after delivering it.
    pub const CHAT_ENDED: &str = "chat_ended";
}

/// A frame as sent by a client. Anything a client sets beyond these two
/// fields is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// A frame as delivered to clients, tagged by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub session_id: SessionId,
    pub sender_id: UserId,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

impl ChatFrame {
    pub fn new(kind: &str, content: Option<String>, session_id: SessionId, sender_id: UserId) -> Self {
        Self {
            kind: kind.to_string(),
            content,
            session_id,
            sender_id,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing plain strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frame types only the server may originate.
pub fn is_server_only(kind: &str) -> bool {
    kind == message_types::CHAT_ENDED
}

#[derive(Deserialize)]
struct FrameKind<'a> {
    #[serde(rename = "type", borrow)]
    kind: &'a str,
}

/// Whether a serialized frame ends its session.
pub fn ends_session(data: &str) -> bool {
    serde_json::from_str::<FrameKind<'_>>(data)
        .map(|f| f.kind == message_types::CHAT_ENDED)
        .unwrap_or(false)
}
