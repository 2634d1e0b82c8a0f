//! Error types of the stub backend.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// REST failures, rendered as `{"error": "..."}` with a matching status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiFailure {
    #[error("Missing or malformed bearer token")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("Conversation {0} not found")]
    NotFound(i64),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        tracing::warn!("Request failed: {}", self);
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Hub invocation failures, sent back in the completion frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("Unknown hub method '{0}'")]
    UnknownMethod(String),

    #[error("Expected a conversation id argument")]
    InvalidArgument,

    #[error("Conversation {0} is not accessible")]
    NotAccessible(i64),

    #[error("Hub invocations are disabled")]
    Disabled,
}
