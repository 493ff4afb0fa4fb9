//! Unified API error handling with structured responses.
//!
//! Central mapping from internal failure kinds to HTTP statuses. Every
//! error body has the shape `{"detail": "..."}`. This table only covers
//! errors raised before the response has started; failures inside an
//! already-running stream are encoded in-band by the stream bridge.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::chat::ClassifyError;
use crate::sora::SoraError;
use crate::stream::BridgeError;

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::Internal(msg) => msg.clone(),
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = self.detail();

        match &self {
            ApiError::Internal(msg) => {
                error!(message = %msg, "API error");
            }
            _ => {
                debug!(message = %detail, "Client error");
            }
        }

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

impl From<ClassifyError> for ApiError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::EmptyMessages => ApiError::BadRequest(err.to_string()),
        }
    }
}

/// Submission failures: client-attributable faults are 400, the backend's
/// own faults are 500. The backend's message is preserved either way.
impl From<SoraError> for ApiError {
    fn from(err: SoraError) -> Self {
        match err {
            SoraError::Client(msg) => ApiError::BadRequest(msg),
            SoraError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

/// Buffered-path terminal failures. Nothing has been sent to the client
/// yet, so these become synchronous 500s.
impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::bad_request("").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::internal("").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_sora_error_fault_attribution() {
        let client = ApiError::from(SoraError::Client("bad remix url".to_string()));
        assert!(matches!(client, ApiError::BadRequest(_)));

        let backend = ApiError::from(SoraError::Backend("oom".to_string()));
        assert!(matches!(backend, ApiError::Internal(_)));
    }

    #[test]
    fn test_empty_messages_is_bad_request() {
        let err = ApiError::from(ClassifyError::EmptyMessages);
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_detail_preserves_backend_message() {
        let err = ApiError::from(SoraError::Client("storyboard too long".to_string()));
        assert_eq!(err.detail(), "storyboard too long");
    }
}
