//! API error types and JSON error response formatting.
//!
//! ApiError maps workflow errors to HTTP status codes with a
//! consistent `{error, message}` body.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docqa_chat::ChatError;
use serde::{Deserialize, Serialize};

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400 - empty or oversized message, malformed body.
    BadRequest(String),
    /// 404 - unknown session.
    NotFound(String),
    /// 409 - the session is in use by a running submission.
    Conflict(String),
    /// 413 - request body over the configured limit.
    PayloadTooLarge(String),
    /// 502 - rewriting, retrieval or answering failed downstream.
    BadGateway(String),
    /// 504 - the invocation exceeded its time limit.
    GatewayTimeout(String),
    /// 500 - anything else.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg),
            ApiError::NotFound(msg) => ("not_found", msg),
            ApiError::Conflict(msg) => ("conflict", msg),
            ApiError::PayloadTooLarge(msg) => ("payload_too_large", msg),
            ApiError::BadGateway(msg) => ("upstream_error", msg),
            ApiError::GatewayTimeout(msg) => ("timeout", msg),
            ApiError::Internal(msg) => ("internal_error", msg),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err {
            ChatError::EmptyMessage | ChatError::MessageTooLong(_) => ApiError::BadRequest(message),
            ChatError::SessionNotFound(_) => ApiError::NotFound(message),
            ChatError::SessionBusy(_) => ApiError::Conflict(message),
            ChatError::Rewrite(_) | ChatError::Retrieval(_) | ChatError::Answer(_) => {
                ApiError::BadGateway(message)
            }
            ChatError::Timeout { .. } => ApiError::GatewayTimeout(message),
            ChatError::Storage(_) => ApiError::Internal(message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}
