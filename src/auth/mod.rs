//! Authentication.
//!
//! Bearer-token auth against a static credential set loaded from config.
//! A missing or malformed `Authorization` header is rejected with 403; a
//! well-formed header carrying an unrecognized token with 401. The two
//! are distinct and both observable by clients.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Auth section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Accepted API keys. An empty list rejects every request.
    pub api_keys: Vec<String>,
    /// Origins allowed by the CORS layer.
    pub allowed_origins: Vec<String>,
}

/// Authentication failures.
#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("Not authenticated")]
    MissingAuthHeader,
    #[error("Not authenticated")]
    InvalidAuthHeader,
    #[error("Invalid API key")]
    UnknownToken,
}

impl AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            // No usable credential was presented at all.
            AuthError::MissingAuthHeader | AuthError::InvalidAuthHeader => StatusCode::FORBIDDEN,
            // A credential was presented and checked, and it is wrong.
            AuthError::UnknownToken => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        debug!("auth rejected: {self:?}");
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Read-only credential set shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    api_keys: Arc<HashSet<String>>,
    allowed_origins: Arc<Vec<String>>,
}

impl AuthState {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            api_keys: Arc::new(config.api_keys.into_iter().collect()),
            allowed_origins: Arc::new(config.allowed_origins),
        }
    }

    /// Get allowed CORS origins from config.
    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    /// Validate a bearer token against the credential set.
    pub fn validate_token(&self, token: &str) -> Result<(), AuthError> {
        if self.api_keys.contains(token) {
            Ok(())
        } else {
            Err(AuthError::UnknownToken)
        }
    }
}

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next().ok_or(AuthError::InvalidAuthHeader)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = parts.next().ok_or(AuthError::InvalidAuthHeader)?;
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }

    if parts.next().is_some() {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok(token)
}

/// Authentication middleware.
///
/// Runs before every protected route; on success the request proceeds
/// unchanged (there is no per-user identity to attach).
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingAuthHeader)?;

    let token = bearer_token_from_header(header)?;
    auth.validate_token(token)?;

    Ok(next.run(req).await)
}
