// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity middleware for the gateway.
//!
//! Callers are authenticated by an upstream identity proxy, which forwards:
//! 1. `X-User-Id` with the verified user id (required)
//! 2. `X-User-Name` with a display name (optional)
//!
//! When a shared secret is configured, the proxy must also present it as
//! `Authorization: Bearer <token>`; requests without it are rejected.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use ring::digest;
use tandem_core::UserId;

/// Header carrying the verified user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller's display name.
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Authentication configuration for the gateway.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Expected bearer token. If `Some`, the proxy must present it.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// The authenticated caller, inserted as a request extension.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: UserId,
    pub display_name: Option<String>,
}

fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Compare SHA-256 digests so the comparison time does not depend on how
/// much of the secret a caller guessed.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let presented = digest::digest(&digest::SHA256, presented.as_bytes());
    let expected = digest::digest(&digest::SHA256, expected.as_bytes());
    presented.as_ref() == expected.as_ref()
}

/// Middleware that checks the proxy secret and attaches an [`AuthUser`].
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(ref expected_token) = auth.bearer_token {
        let presented = header(&request, "authorization").and_then(|v| v.strip_prefix("Bearer "));
        if !presented.is_some_and(|token| tokens_match(token, expected_token)) {
            tracing::debug!("rejecting request without a valid proxy token");
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    let Some(user_id) = header(&request, USER_ID_HEADER).map(UserId::from) else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    let display_name = header(&request, USER_NAME_HEADER).map(str::to_string);

    request.extensions_mut().insert(AuthUser {
        id: user_id,
        display_name,
    });
    Ok(next.run(request).await)
}
