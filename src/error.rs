//! Error taxonomy for the store and the HTTP boundary.
//!
//! [`ApiError`] is the only error that reaches clients. It renders as the
//! standard envelope with a machine-readable code; internal causes are logged
//! and replaced by a generic message.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::rest::{ApiResponse, ErrorBody};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("email already exists")]
    DuplicateEmail,
    #[error("corrupt index entry for {0}")]
    Corrupt(String),
}

/// Field name to message.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("unauthorized")]
    Unauthorized,
    #[error("missing authorization token")]
    MissingToken,
    #[error("invalid token format")]
    InvalidTokenFormat,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("forbidden")]
    Forbidden,
    #[error("resource not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("resource already exists: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials
            | ApiError::Unauthorized
            | ApiError::MissingToken
            | ApiError::InvalidTokenFormat
            | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::MissingToken => "MISSING_TOKEN",
            ApiError::InvalidTokenFormat => "INVALID_TOKEN_FORMAT",
            ApiError::InvalidToken => "INVALID_TOKEN",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn body(&self) -> ErrorBody {
        let (message, details) = match self {
            ApiError::InvalidRequest(_) => ("Invalid request".to_string(), None),
            ApiError::Validation(fields) => (
                "Validation failed".to_string(),
                serde_json::to_value(fields).ok(),
            ),
            ApiError::InvalidCredentials => ("Invalid email or password".to_string(), None),
            ApiError::Unauthorized => ("Unauthorized access".to_string(), None),
            ApiError::MissingToken => ("Missing authorization token".to_string(), None),
            ApiError::InvalidTokenFormat => ("Invalid token format".to_string(), None),
            ApiError::InvalidToken => ("Invalid or expired token".to_string(), None),
            ApiError::Forbidden => ("Access forbidden".to_string(), None),
            ApiError::NotFound => ("Resource not found".to_string(), None),
            ApiError::MethodNotAllowed => ("Method not allowed".to_string(), None),
            ApiError::Conflict(detail) => (
                "Resource already exists".to_string(),
                Some(serde_json::Value::String(detail.clone())),
            ),
            ApiError::Internal(_) => ("Internal server error".to_string(), None),
        };
        ErrorBody {
            code: self.code().to_string(),
            message,
            details,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => ApiError::Conflict("Email already registered".into()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body: ApiResponse<()> = ApiResponse::failure(self.body());
        (status, Json(body)).into_response()
    }
}
