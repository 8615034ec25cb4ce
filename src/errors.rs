use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Workflow failures, translated at the response boundary into the numeric
/// code envelope the client branches on.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("a user with that email already exists")]
    DuplicateEmail,

    #[error("the specified team does not exist")]
    TeamNotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("email does not exist")]
    EmailNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("user does not exist")]
    UnknownUser,

    #[error("invalid recovery token")]
    InvalidResetToken,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.into())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: i32,
    message: String,
}

impl AppError {
    /// Client-facing numeric code, kept stable across releases.
    pub fn code(&self) -> i32 {
        match self {
            AppError::Validation(_) => -1,
            AppError::DuplicateEmail => -2,
            AppError::TeamNotFound | AppError::InvalidResetToken => -3,
            AppError::InvalidCredentials => -5,
            AppError::EmailNotFound => -8,
            AppError::UserNotFound => -10,
            AppError::UnknownUser => -25,
            AppError::Internal(_) => -100,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::DuplicateEmail => StatusCode::BAD_REQUEST,
            AppError::TeamNotFound
            | AppError::EmailNotFound
            | AppError::UserNotFound
            | AppError::InvalidResetToken => StatusCode::NOT_FOUND,
            AppError::InvalidCredentials | AppError::UnknownUser => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = self.status();
        let message = match &self {
            // Detail stays in the logs, not in the response.
            AppError::Internal(err) => {
                error!(error = %err, "unhandled error");
                "an unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { code, message })).into_response()
    }
}
