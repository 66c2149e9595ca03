use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures of the permission and hierarchy core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Entity store unreachable or errored
    #[error("lookup failed: {0}")]
    LookupFailed(String),

    /// Referenced record is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Structurally invalid record
    #[error("malformed record: {0}")]
    Malformed(String),
}

impl From<sea_orm::DbErr> for AccessError {
    fn from(err: sea_orm::DbErr) -> Self {
        AccessError::LookupFailed(err.to_string())
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Access forbidden: missing {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Forbidden(perm) => (StatusCode::FORBIDDEN, "Forbidden", Some(perm.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not Found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad Request", Some(msg.clone())),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", None)
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database Error", None)
            }
            AppError::Json(err) => {
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(err.to_string()))
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "Validation Error", Some(msg.clone()))
            }
            AppError::Access(AccessError::LookupFailed(msg)) => {
                tracing::error!("Lookup failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Lookup Failed", None)
            }
            AppError::Access(AccessError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "Not Found", Some(msg.clone()))
            }
            AppError::Access(AccessError::Malformed(msg)) => {
                (StatusCode::BAD_REQUEST, "Malformed", Some(msg.clone()))
            }
        };

        let body = ErrorResponse {
            code: status.as_u16(),
            msg: message.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for application
pub type AppResult<T> = Result<T, AppError>;

/// Helper trait for converting Option to AppError::NotFound
pub trait OptionExt<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(msg.into()))
    }
}

impl From<crate::identity::AuthError> for AppError {
    fn from(err: crate::identity::AuthError) -> Self {
        use crate::identity::AuthError;
        match err {
            // Same message for both so usernames cannot be enumerated
            AuthError::UserNotFound | AuthError::BadPassword => {
                AppError::BadRequest("username or password error".to_string())
            }
            AuthError::UserDisabled => AppError::BadRequest("user is disabled".to_string()),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// Helper to convert anyhow errors to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
