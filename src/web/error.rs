//! Web error types for the sync server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error type for web API operations.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request with validation error.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflict with the recorder state (e.g. already recording).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The capture source failed or produced an unusable tree.
    #[error("Capture error: {0}")]
    Upstream(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            WebError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not Found", Some(msg.clone())),
            WebError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad Request", Some(msg.clone()))
            }
            WebError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            WebError::Upstream(msg) => {
                tracing::warn!("Capture error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Capture Error", Some(msg.clone()))
            }
            WebError::Internal(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<crate::Error> for WebError {
    fn from(err: crate::Error) -> Self {
        use crate::Error;

        let message = err.to_string();
        match err {
            Error::AlreadyRecording | Error::NotRecording | Error::EmptySnapshot => {
                WebError::Conflict(message)
            }
            Error::UnknownNode(_) => WebError::NotFound(message),
            Error::InvalidSpeed(_)
            | Error::IndexOutOfRange { .. }
            | Error::UnsupportedCommand(_)
            | Error::InvalidRecordingFile(_) => WebError::BadRequest(message),
            Error::Capture(_) | Error::InvalidTree(_) => WebError::Upstream(message),
            Error::DeltaApplicationFailure { .. }
            | Error::Channel(_)
            | Error::Io(_)
            | Error::Json(_) => WebError::Internal(message),
        }
    }
}

impl From<anyhow::Error> for WebError {
    fn from(err: anyhow::Error) -> Self {
        WebError::Internal(err.to_string())
    }
}
