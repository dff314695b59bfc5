//! Bearer-token gate in front of every API route.
//!
//! One static shared secret, resolved at startup, checked on every request
//! before any handler logic runs. There are no exempt API routes; only the
//! liveness probe lives outside the gate.
//!
//! ## Design
//!
//! Rejection bodies are part of the wire contract: existing callers match
//! on the exact strings, so a missing header answers `Token diperlukan!`
//! and anything else that fails the check answers `Token tidak valid!`,
//! both with status 403. The comparison is constant-time.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use super::AppState;

/// Why the gate rejected a request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Token diperlukan!")]
    MissingToken,
    #[error("Token tidak valid!")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "message": self.to_string() });
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

/// Static shared-secret credential check.
pub struct TokenGuard {
    token: String,
}

impl TokenGuard {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Check the `Authorization: Bearer <token>` header against the secret.
    ///
    /// A present-but-malformed header (wrong scheme, undecodable value)
    /// counts as an invalid credential, not a missing one.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        if !headers.contains_key(header::AUTHORIZATION) {
            return Err(AuthError::MissingToken);
        }
        match extract_bearer_token(headers) {
            Some(provided) if constant_time_eq(provided.as_bytes(), self.token.as_bytes()) => {
                Ok(())
            }
            _ => Err(AuthError::InvalidToken),
        }
    }
}

/// Extract the bearer token from the Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Middleware: reject the request unless it carries the credential.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match state.guard.check(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(rejection) => rejection.into_response(),
    }
}
