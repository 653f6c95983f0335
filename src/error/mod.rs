//! Error hierarchy (§7). One `thiserror` enum per concern, grounded on
//! `error/pollux.rs` + `error/oauth.rs` + `error/gemini.rs` in the teacher:
//! small focused enums rather than one flat kitchen-sink type, each wired to
//! `axum::response::IntoResponse` with a Claude-style error body, plus an
//! `IsRetryable` trait the orchestrator's retry loop consults.

mod gemini;
mod oauth;

pub use gemini::{GeminiErrorBody, GeminiRateLimit};
pub use oauth::OauthError;

use axum::{Json, http::StatusCode, response::IntoResponse};
use relaymux_schema::claude::ClaudeErrorBody;
use thiserror::Error as ThisError;

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, ThisError)]
pub enum RelayError {
    #[error("no eligible account for this request")]
    NoEligibleAccount,

    #[error(transparent)]
    Token(#[from] OauthError),

    #[error("upstream rate limited")]
    UpstreamRateLimit { retry_after_seconds: u64 },

    #[error("upstream returned {status}: {detail}")]
    UpstreamClientError {
        status: StatusCode,
        detail: String,
    },

    #[error("upstream server error: {0}")]
    UpstreamServerError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request conversion failed: {0}")]
    Conversion(String),

    #[error("upstream stream protocol error: {0}")]
    Stream(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl IsRetryable for RelayError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::NoEligibleAccount
                | RelayError::Token(_)
                | RelayError::UpstreamRateLimit { .. }
                | RelayError::UpstreamServerError(_)
                | RelayError::Http(_)
        )
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match &self {
            RelayError::NoEligibleAccount => (
                StatusCode::SERVICE_UNAVAILABLE,
                ClaudeErrorBody::new("overloaded_error", "No available accounts"),
            ),
            RelayError::Token(_) => (
                StatusCode::BAD_GATEWAY,
                ClaudeErrorBody::new("api_error", self.to_string()),
            ),
            RelayError::UpstreamRateLimit { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                ClaudeErrorBody::new("rate_limit_error", "Upstream rate limit exceeded"),
            ),
            RelayError::UpstreamClientError { status, detail } => (
                *status,
                ClaudeErrorBody::new("invalid_request_error", detail.clone()),
            ),
            RelayError::UpstreamServerError(detail) => (
                StatusCode::BAD_GATEWAY,
                ClaudeErrorBody::new("api_error", detail.clone()),
            ),
            RelayError::InvalidRequest(detail) => (
                StatusCode::BAD_REQUEST,
                ClaudeErrorBody::new("invalid_request_error", detail.clone()),
            ),
            RelayError::Conversion(detail) => (
                StatusCode::BAD_REQUEST,
                ClaudeErrorBody::new("invalid_request_error", detail.clone()),
            ),
            RelayError::Stream(detail) => (
                StatusCode::BAD_GATEWAY,
                ClaudeErrorBody::new("api_error", detail.clone()),
            ),
            RelayError::Database(_) | RelayError::Unexpected(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ClaudeErrorBody::new("api_error", "An internal server error occurred"),
            ),
            RelayError::Http(_) => (
                StatusCode::BAD_GATEWAY,
                ClaudeErrorBody::new("api_error", "Upstream connection error"),
            ),
            RelayError::Json(_) => (
                StatusCode::BAD_GATEWAY,
                ClaudeErrorBody::new("api_error", "Failed to parse upstream response"),
            ),
        };
        (status, Json(body)).into_response()
    }
}
