//! Application error types for the hub and its HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("JWT error: {0}")]
    Jwt(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Close-code style number sent in realtime `error` frames.
    pub fn ws_code(&self) -> u16 {
        match self {
            AppError::Serialization(_) => 4000,
            AppError::Validation(_) => 4001,
            AppError::Auth(_) | AppError::Jwt(_) => 4002,
            AppError::Forbidden(_) => 4003,
            AppError::NotFound(_) => 4004,
            _ => 4500,
        }
    }

    /// Whether the failure came from the user directory or the bus rather than the client.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            AppError::Redis(_) | AppError::Db(_) | AppError::Internal(_)
        )
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Redis(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Redis error: {}", e),
            ),
            AppError::Db(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Database error: {}", e),
            ),
            AppError::Serialization(e) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid payload: {}", e),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Jwt(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", e),
            ),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
