// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket connection loops.
//!
//! Each connection runs a reader and a writer sharing one bounded outbound
//! queue owned by the hub. The reader's deadline is refreshed by every frame,
//! pongs included; a missed deadline ends the connection. The writer pings on
//! a fixed interval and sends a close frame once the hub drops its queue.

use axum::{
    Extension,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};

use tandem_core::{SessionId, UserId};

use crate::auth::AuthUser;
use crate::chat::ChatService;
use crate::handlers::ApiError;
use crate::hub::{Client, next_client_id};
use crate::server::{ChatSettings, GatewayState};

/// Query parameters for the WebSocket upgrade.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub session_id: String,
}

/// GET /api/chat/ws?session_id=...
///
/// Only participants of an active session may connect.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<WsParams>,
) -> Response {
    let session_id = SessionId::from(params.session_id);
    if let Err(e) = state.chat.authorize_live(&session_id, &user.id).await {
        return ApiError(e).into_response();
    }

    let settings = state.settings;
    let chat = state.chat.clone();
    ws.max_message_size(settings.read_limit_bytes)
        .on_upgrade(move |socket| handle_socket(socket, chat, settings, user.id, session_id))
}

async fn handle_socket(
    socket: WebSocket,
    chat: ChatService,
    settings: ChatSettings,
    user_id: UserId,
    session_id: SessionId,
) {
    let (ws_sender, ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<String>(settings.send_queue_capacity.max(1));
    let client_id = next_client_id();

    let hub = chat.hub().clone();
    if let Err(e) = hub
        .register(Client {
            id: client_id,
            user_id: user_id.clone(),
            session_id: session_id.clone(),
            sender: tx,
        })
        .await
    {
        tracing::warn!(error = %e, "could not register connection");
        return;
    }
    tracing::debug!(user_id = %user_id, session_id = %session_id, client_id, "connection opened");

    let mut writer = tokio::spawn(write_loop(ws_sender, rx, settings));
    let reader = read_loop(ws_receiver, &chat, &settings, &user_id, &session_id);

    let writer_done = tokio::select! {
        _ = reader => false,
        _ = &mut writer => true,
    };

    if let Err(e) = hub.unregister(session_id.clone(), client_id).await {
        tracing::debug!(error = %e, "unregister after hub shutdown");
    }
    if !writer_done {
        // The hub dropped our queue; give the writer a chance to send close.
        let _ = timeout(settings.write_wait, writer).await;
    }
    tracing::debug!(user_id = %user_id, session_id = %session_id, client_id, "connection closed");
}

async fn read_loop(
    mut receiver: SplitStream<WebSocket>,
    chat: &ChatService,
    settings: &ChatSettings,
    user_id: &UserId,
    session_id: &SessionId,
) {
    loop {
        let msg = match timeout(settings.pong_wait, receiver.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "websocket read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::debug!(user_id = %user_id, "read deadline missed, dropping peer");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                chat.handle_frame(session_id, user_id, text.as_str()).await;
            }
            Message::Close(_) => break,
            // Pings, pongs, and binary frames only refresh the deadline.
            _ => {}
        }
    }
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
    settings: ChatSettings,
) {
    let mut ticker = interval_at(Instant::now() + settings.ping_interval, settings.ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let outgoing = tokio::select! {
            item = rx.recv() => match item {
                Some(text) => Message::Text(text.into()),
                None => {
                    let _ = timeout(settings.write_wait, sender.send(Message::Close(None))).await;
                    return;
                }
            },
            _ = ticker.tick() => Message::Ping(Default::default()),
        };
        match timeout(settings.write_wait, sender.send(outgoing)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "websocket write error");
                return;
            }
            Err(_) => {
                tracing::debug!("write deadline missed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_params_require_session() {
        let ok: Result<WsParams, _> = serde_json::from_str(r#"{"session_id": "s-1"}"#);
        assert_eq!(ok.unwrap().session_id, "s-1");
        let missing: Result<WsParams, _> = serde_json::from_str("{}");
        assert!(missing.is_err());
    }
}
