//! Uniform API error envelope.
//!
//! Every endpoint answers errors as `{error, message, code, details}`.
//! Internal faults are logged and mapped to a generic 500 without leaking
//! detail.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::kernel::accounts::AccountError;
use crate::kernel::jobs::{JobError, SyncError};
use extraction::GraphQueryError;

/// Wire shape of every API error.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    /// Stable machine-readable tag
    pub error: String,

    /// Human-readable description
    pub message: String,

    /// HTTP status code, duplicated in the body
    pub code: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Typed API errors; each maps to one envelope and status code.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    AuthExpired(String),
    Forbidden(String),
    NotFound(String),
    AlreadyRunning,
    Conflict(String),
    QueryRejected(String),
    QueryTimeout,
    Internal(anyhow::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone())
            }
            ApiError::AuthExpired(msg) => (
                StatusCode::UNAUTHORIZED,
                "auth_expired",
                format!("reconnect required: {}", msg),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::AlreadyRunning => (
                StatusCode::CONFLICT,
                "already_running",
                "a sync job is already running for this account".to_string(),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::QueryRejected(msg) => {
                (StatusCode::BAD_REQUEST, "query_rejected", msg.clone())
            }
            ApiError::QueryTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "query_timeout",
                "query exceeded the execution timeout".to_string(),
            ),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self {
            error!(error = %err, "internal error");
        }
        let (status, tag, message) = self.parts();
        let envelope = ErrorEnvelope {
            error: tag.to_string(),
            message,
            code: status.as_u16(),
            details: None,
        };
        (status, Json(envelope)).into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::AlreadyRunning => ApiError::AlreadyRunning,
            SyncError::AuthExpired(reason) => ApiError::AuthExpired(reason),
            SyncError::NotFound => ApiError::NotFound("sync job not found".to_string()),
            SyncError::NotCancellable => {
                ApiError::Conflict("job already finished".to_string())
            }
            SyncError::Internal(msg) => ApiError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        ApiError::from(SyncError::from(err))
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::NotFound => ApiError::NotFound("account not found".to_string()),
            AccountError::Storage(e) => ApiError::Internal(anyhow::anyhow!(e)),
        }
    }
}

impl From<GraphQueryError> for ApiError {
    fn from(err: GraphQueryError) -> Self {
        match err {
            GraphQueryError::Rejected { reason } => ApiError::QueryRejected(reason),
            GraphQueryError::Timeout => ApiError::QueryTimeout,
            GraphQueryError::Storage(e) => ApiError::Internal(anyhow::anyhow!(e)),
        }
    }
}

impl From<extraction::ExtractionError> for ApiError {
    fn from(err: extraction::ExtractionError) -> Self {
        match err {
            extraction::ExtractionError::AuthExpired(reason) => ApiError::AuthExpired(reason),
            other => ApiError::Internal(anyhow::anyhow!(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_the_taxonomy() {
        assert_eq!(ApiError::AlreadyRunning.parts().0, StatusCode::CONFLICT);
        assert_eq!(
            ApiError::AuthExpired("x".into()).parts().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::QueryRejected("x".into()).parts().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::QueryTimeout.parts().0, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ApiError::NotFound("x".into()).parts().0,
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = ApiError::Internal(anyhow::anyhow!("secret database password"));
        let (_, _, message) = err.parts();
        assert_eq!(message, "internal server error");
    }
}
