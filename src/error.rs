use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Riot API error: {0}")]
    Riot(#[from] RiotError),

    #[error("Discord error: {0}")]
    Discord(#[from] DeliveryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("External service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Outcome kinds of a stats API call, switched on by callers instead of
/// inspecting error strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiotError {
    /// Expected absence (player not in game, match not yet available).
    #[error("not found")]
    NotFound,

    #[error("rate limited, retry after {}s", retry_after.as_secs_f64())]
    RateLimited { retry_after: Duration },

    #[error("server error (status {status})")]
    Server { status: u16 },

    #[error("request rejected (status {status}): {message}")]
    Client { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl RiotError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RiotError::NotFound)
    }

    /// Backpressure, 5xx, a timed-out attempt and connection-level failures are
    /// worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RiotError::RateLimited { .. }
                | RiotError::Server { .. }
                | RiotError::Timeout
                | RiotError::Transport(_)
        )
    }
}

/// Outcome kinds of a message delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The bot permanently lost access to the channel; tracking should stop.
    #[error("lost access to channel (discord code {code}): {message}")]
    PermissionLost { code: u64, message: String },

    #[error("rate limited by discord")]
    RateLimited,

    #[error("{0}")]
    Failed(String),
}

impl DeliveryError {
    #[cfg(test)]
    pub fn is_permission_lost(&self) -> bool {
        matches!(self, DeliveryError::PermissionLost { .. })
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing or invalid admin token".to_string(),
            ),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                msg.clone(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Riot(e) => {
                tracing::error!("Riot API error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "RIOT_API_ERROR",
                    "Failed to communicate with the stats API".to_string(),
                )
            }
            AppError::Discord(e) => {
                tracing::error!("Discord error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "DISCORD_ERROR",
                    "Failed to communicate with Discord".to_string(),
                )
            }
            _ => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
