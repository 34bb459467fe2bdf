//! Request-boundary errors.
//!
//! Every failure on a route ends up here; the message is what the client
//! sees, so internal detail stays in the logs.

use axum::http::StatusCode;
use parley_session::SessionError;

/// API error with status code and client-facing message.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, code: "bad_request", message: msg.into() }
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, code: "not_found", message: msg.into() }
    }
    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self { status: StatusCode::TOO_MANY_REQUESTS, code: "rate_limited", message: msg.into() }
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, code: "internal_error", message: msg.into() }
    }

    pub fn missing_params() -> Self {
        Self::bad_request("Please provide both prompt and id parameters.")
    }

    pub fn no_conversation() -> Self {
        Self::not_found("No conversation found for this ID.")
    }

    pub fn generation_failed() -> Self {
        Self::internal("An error occurred while generating the AI response.")
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::RateLimited { .. } => ApiError::too_many_requests(
                "Request limit exceeded. Please provide a valid API key for unlimited requests.",
            ),
            SessionError::Busy { .. } => ApiError::too_many_requests(
                "A reply for this id is still being generated. Please retry shortly.",
            ),
            SessionError::NotFound { .. } => ApiError::no_conversation(),
            SessionError::Superseded { .. } => ApiError::generation_failed(),
        }
    }
}
