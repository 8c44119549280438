//! Internal-error-class to HTTP-status mapping (§4.5) and the `{"error": ...}`
//! envelope every endpoint returns on failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

pub enum ApiError {
    BadToken,
    BadRequest(String),
    Conflict(String),
    RateLimited,
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadToken => (StatusCode::UNAUTHORIZED, "invalid or missing API token".to_string()),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded".to_string()),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<lockbox_domain::Error> for ApiError {
    fn from(e: lockbox_domain::Error) -> Self {
        use lockbox_domain::Error::*;
        match e {
            NotFound(m) => ApiError::BadRequest(m),
            Conflict(m) => ApiError::Conflict(m),
            Auth(m) => {
                tracing::warn!(error = %m, "auth error surfaced from a domain call");
                ApiError::BadToken
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}
