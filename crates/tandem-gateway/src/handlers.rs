// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use tandem_core::{HealthStatus, Location, Message, PluginAdapter, SessionId, TandemError, UserId};
use tandem_matching::MatchResult;

use crate::auth::AuthUser;
use crate::server::GatewayState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
}

/// A [`TandemError`] rendered as an HTTP response.
///
/// Caller errors keep their message; infrastructure errors are logged and
/// reported generically.
#[derive(Debug)]
pub struct ApiError(pub TandemError);

impl From<TandemError> for ApiError {
    fn from(e: TandemError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TandemError::NoLocation | TandemError::InvalidLocation { .. } => {
                StatusCode::BAD_REQUEST
            }
            TandemError::NoCandidates
            | TandemError::UnknownUser(_)
            | TandemError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            TandemError::Forbidden(_) => StatusCode::FORBIDDEN,
            TandemError::Conflict(_) => StatusCode::CONFLICT,
            TandemError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if self.0.is_user_error() {
            self.0.to_string()
        } else {
            tracing::error!(error = %self.0, "request failed");
            "internal server error".to_string()
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Request body for PUT /api/users/me/location.
#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lon: f64,
}

/// Response body for the score endpoint.
#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub user_id: UserId,
    pub score: f64,
}

/// Response body for the match endpoints.
#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub matched: bool,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status string.
    pub status: String,
    /// Binary version.
    pub version: String,
    /// This instance's bus identity.
    pub instance_id: String,
    /// Seconds since the gateway state was built.
    pub uptime_secs: u64,
}

/// PUT /api/users/me/location
///
/// Creates the user on first contact, using `X-User-Name` (or the id) as the
/// display name.
pub async fn put_location(
    State(state): State<GatewayState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<LocationRequest>,
) -> Result<Json<Location>, ApiError> {
    let location = Location::new(body.lat, body.lon)?;

    let known = state.store.get_user(&user.id).await?.is_some();
    if !known || user.display_name.is_some() {
        let name = user
            .display_name
            .clone()
            .unwrap_or_else(|| user.id.to_string());
        state.store.upsert_user(&user.id, &name).await?;
    }
    state.store.set_location(&user.id, location).await?;

    tracing::debug!(user_id = %user.id, "location updated");
    Ok(Json(location))
}

/// GET /api/users/me/score
pub async fn get_score(
    State(state): State<GatewayState>,
    Extension(user): Extension<AuthUser>,
) -> Json<ScoreResponse> {
    let score = state.scoring.get_score(&user.id).await;
    Json(ScoreResponse {
        user_id: user.id,
        score,
    })
}

/// GET /api/match/today
pub async fn get_today_match(
    State(state): State<GatewayState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MatchResponse>, ApiError> {
    let response = match state.matcher.today_match(&user.id).await? {
        Some(result) => MatchResponse {
            matched: true,
            result: Some(result),
            message: None,
        },
        None => MatchResponse {
            matched: false,
            result: None,
            message: Some("no match yet today".to_string()),
        },
    };
    Ok(Json(response))
}

/// POST /api/match/find
pub async fn post_find_match(
    State(state): State<GatewayState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MatchResponse>, ApiError> {
    let result = state.matcher.find_or_create_match(&user.id).await?;
    Ok(Json(MatchResponse {
        matched: true,
        result: Some(result),
        message: None,
    }))
}

/// GET /api/chat/{session_id}/messages
pub async fn get_messages(
    State(state): State<GatewayState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state
        .chat
        .history(&SessionId::from(session_id), &user.id)
        .await?;
    Ok(Json(messages))
}

/// POST /api/chat/{session_id}/end
pub async fn post_end_chat(
    State(state): State<GatewayState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .chat
        .end_chat(&SessionId::from(session_id), &user.id)
        .await?;
    Ok(Json(serde_json::json!({ "status": "ended" })))
}

/// GET /health
///
/// Reports `unhealthy` with 503 when the store cannot be reached.
pub async fn get_health(State(state): State<GatewayState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, code) = match state.store.health_check().await {
        Ok(HealthStatus::Healthy) => ("ok", StatusCode::OK),
        Ok(HealthStatus::Degraded(reason)) => {
            tracing::warn!(%reason, "store degraded");
            ("degraded", StatusCode::OK)
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            tracing::warn!(%reason, "store unhealthy");
            ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
        }
        Err(e) => {
            tracing::warn!(error = %e, "store health check failed");
            ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
        }
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instance_id: state.chat.hub().instance_id().to_string(),
            uptime_secs: state.start_time.elapsed().as_secs(),
        }),
    )
}
