//! HTTP transport error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP transport error types
#[derive(Debug, Error)]
pub enum Error {
    /// Session admission, negotiation, or setup error
    #[error(transparent)]
    Session(#[from] mediarelay_webrtc::Error),

    /// Event body could not be parsed
    #[error("Invalid event: {0}")]
    MalformedEvent(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broadcast hub loop has stopped
    #[error("Broadcast hub is not running")]
    HubClosed,

    /// Server error
    #[error("Server error: {0}")]
    ServerError(String),
}

/// Result type for HTTP transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type (e.g., "busy", "bad_request", "setup")
    pub error_type: String,
    /// Human-readable error message
    pub message: String,
    /// Failing setup stage, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl Error {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            Error::Session(e) if e.is_admission_conflict() => {
                (StatusCode::SERVICE_UNAVAILABLE, "busy")
            }
            Error::Session(e) if e.is_malformed_input() => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::Session(e) if e.is_setup_failure() => {
                (StatusCode::INTERNAL_SERVER_ERROR, "setup")
            }
            Error::MalformedEvent(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::HubClosed => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let stage = match &self {
            Error::Session(e) => e.stage().map(str::to_string),
            _ => None,
        };

        if status.is_server_error() {
            tracing::error!(error_type, "{}", self);
        } else {
            tracing::warn!(error_type, "{}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error_type: error_type.to_string(),
                message: self.to_string(),
                stage,
            }),
        )
            .into_response()
    }
}
