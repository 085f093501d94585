use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::RulesError;
use crate::engine::ScoringError;
use crate::orchestration::{GradingError, IngressError};

/// HTTP-facing error taxonomy.
///
/// `BadRequest` covers invalid input and invalid rules at creation (never
/// retried); `Conflict` is the idempotent-duplicate signal; transient storage
/// trouble surfaces as `Internal` after the retry budget inside the pipeline
/// is exhausted.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<RulesError> for AppError {
    fn from(err: RulesError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<ScoringError> for AppError {
    fn from(err: ScoringError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<IngressError> for AppError {
    fn from(err: IngressError) -> Self {
        match err {
            IngressError::UnknownMatch(id) => AppError::NotFound(format!("match {}", id)),
            IngressError::NotTerminal(_) => AppError::BadRequest(err.to_string()),
            IngressError::Db(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<GradingError> for AppError {
    fn from(err: GradingError) -> Self {
        match err {
            GradingError::PredictionNotFound(id) => {
                AppError::NotFound(format!("prediction {}", id))
            }
            GradingError::ContestNotFound(id) => AppError::NotFound(format!("contest {}", id)),
            GradingError::MatchNotFound(id) => AppError::NotFound(format!("match {}", id)),
            GradingError::InvalidRules(e) => AppError::BadRequest(e.to_string()),
            GradingError::InvalidSelection(e) => AppError::BadRequest(e.to_string()),
            GradingError::Db(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
