use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::store::StoreError;

/// Failure kinds surfaced by authentication, onboarding and bubble operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or unknown token")]
    InvalidToken,

    #[error("Service unreachable: {0}")]
    Unreachable(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Wire tag for [`AuthError`]; clients dispatch on this, never on the message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidCredentials,
    InvalidToken,
    Unreachable,
    Validation,
    Unauthorized,
    NotFound,
    Conflict,
    Internal,
}

/// JSON error body returned by every handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthError::InvalidToken => ErrorKind::InvalidToken,
            AuthError::Unreachable(_) => ErrorKind::Unreachable,
            AuthError::Validation(_) => ErrorKind::Validation,
            AuthError::Unauthorized => ErrorKind::Unauthorized,
            AuthError::NotFound(_) => ErrorKind::NotFound,
            AuthError::Conflict(_) => ErrorKind::Conflict,
            AuthError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Rebuild an error from a decoded wire body.
    pub fn from_body(body: ErrorBody) -> Self {
        match body.kind {
            ErrorKind::InvalidCredentials => AuthError::InvalidCredentials,
            ErrorKind::InvalidToken => AuthError::InvalidToken,
            ErrorKind::Unreachable => AuthError::Unreachable(body.message),
            ErrorKind::Validation => AuthError::Validation(strip_prefix(&body.message, "Validation failed: ")),
            ErrorKind::Unauthorized => AuthError::Unauthorized,
            ErrorKind::NotFound => AuthError::NotFound(strip_prefix(&body.message, "Not found: ")),
            ErrorKind::Conflict => AuthError::Conflict(strip_prefix(&body.message, "Conflict: ")),
            ErrorKind::Internal => AuthError::Internal(body.message),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AuthError::Validation(msg.into())
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        AuthError::Internal(e.to_string())
    }
}

fn strip_prefix(message: &str, prefix: &str) -> String {
    message.strip_prefix(prefix).unwrap_or(message).to_string()
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => AuthError::NotFound(what),
            StoreError::Conflict(what) => AuthError::Conflict(what),
            StoreError::Unavailable(msg) => AuthError::Unreachable(msg),
            StoreError::Backend(msg) => AuthError::Internal(msg),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
