use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller does not own the resource. The message is never shown to clients.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Media lookup unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The item write and its statistics write could not both commit; neither was applied.
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::UpstreamUnavailable(format!("request timed out: {}", err))
        } else {
            AppError::UpstreamUnavailable(err.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Duplicate(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unauthorized(_) => (
                StatusCode::UNAUTHORIZED,
                "Missing or invalid credentials".to_string(),
            ),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "Access denied".to_string()),
            AppError::UpstreamUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Media metadata service unavailable, try again later: {}", msg),
            ),
            AppError::Consistency(msg) => (StatusCode::CONFLICT, msg),
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "Request failed with internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
