use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::ErrorDetail;

/// RepositoryError
///
/// Failures surfaced by the CRUD layer. The router only distinguishes the two
/// business kinds; everything else is an internal error.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A business rule was violated (insufficient stock, invalid rep, bad quantities...).
    #[error("{0}")]
    Validation(String),

    /// The caller is not allowed to act on the resource.
    #[error("{0}")]
    Permission(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// ApiError
///
/// An HTTP status plus the message sent back as `{"detail": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Could not validate credentials")
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Validation -> 400 and Permission -> 403, both keeping the original message.
/// Database failures are logged here and hidden behind a generic 500.
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Validation(msg) => Self::bad_request(msg),
            RepositoryError::Permission(msg) => Self::forbidden(msg),
            RepositoryError::Database(e) => {
                tracing::error!("repository failure: {:?}", e);
                Self::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorDetail { detail: self.detail })).into_response()
    }
}
