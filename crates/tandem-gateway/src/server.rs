// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tandem_core::{ChatStore, TandemError};
use tandem_matching::MatchEngine;
use tandem_scoring::ScoringEngine;

use crate::auth::{AuthConfig, auth_middleware};
use crate::chat::ChatService;
use crate::handlers;
use crate::ws;

/// Per-connection WebSocket limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSettings {
    pub send_queue_capacity: usize,
    pub read_limit_bytes: usize,
    pub pong_wait: Duration,
    pub ping_interval: Duration,
    pub write_wait: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            send_queue_capacity: 256,
            read_limit_bytes: 4096,
            pong_wait: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
            write_wait: Duration::from_secs(10),
        }
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<dyn ChatStore>,
    pub matcher: Arc<MatchEngine>,
    pub scoring: ScoringEngine,
    pub chat: ChatService,
    pub auth: AuthConfig,
    pub settings: ChatSettings,
    /// Process start time for uptime calculation.
    pub start_time: Instant,
}

/// Gateway server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

/// Build the application router.
///
/// - GET /health (public)
/// - PUT /api/users/me/location, GET /api/users/me/score
/// - GET /api/match/today, POST /api/match/find
/// - GET /api/chat/{session_id}/messages, POST /api/chat/{session_id}/end
/// - GET /api/chat/ws?session_id=...
pub fn router(state: GatewayState) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/api/users/me/location", put(handlers::put_location))
        .route("/api/users/me/score", get(handlers::get_score))
        .route("/api/match/today", get(handlers::get_today_match))
        .route("/api/match/find", post(handlers::post_find_match))
        .route("/api/chat/ws", get(ws::ws_handler))
        .route("/api/chat/{session_id}/messages", get(handlers::get_messages))
        .route("/api/chat/{session_id}/end", post(handlers::post_end_chat))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the configured address.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, TandemError> {
    let addr = format!("{}:{}", config.host, config.port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| TandemError::Channel {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Serve until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), TandemError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("gateway listening on {addr}");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| TandemError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_settings_defaults() {
        let s = ChatSettings::default();
        assert_eq!(s.send_queue_capacity, 256);
        assert!(s.ping_interval < s.pong_wait);
    }

    #[test]
    fn server_config_debug() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("127.0.0.1"));
    }
}
