use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineError;
use crate::lifecycle::LifecycleError;
use crate::orchestrator::OrchestratorError;

/// Top-level error surfaced to the HTTP boundary (spec §7 taxonomy).
///
/// Each variant maps one of Validation / Collision / Runtime / Consistency /
/// Invariant onto an HTTP status, following the same `thiserror` +
/// `IntoResponse` translation chain the teacher's `todo_backend::error`
/// module uses for `sqlx::Error`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Collision(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden")]
    Forbidden,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn collision(msg: impl Into<String>) -> Self {
        Self::Collision(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            ApiError::Collision(_) => (StatusCode::CONFLICT, "collision"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Engine(EngineError::Unknown(_)) => (StatusCode::BAD_REQUEST, "engine_unknown"),
            ApiError::Engine(EngineError::ConfigInvalid { .. }) => {
                (StatusCode::BAD_REQUEST, "config_invalid")
            }
            ApiError::Engine(EngineError::Op { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "engine_op_failed")
            }
            ApiError::Orchestrator(_) => (StatusCode::INTERNAL_SERVER_ERROR, "runtime_error"),
            ApiError::Lifecycle(LifecycleError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, "invalid_transition")
            }
            ApiError::Lifecycle(_) => (StatusCode::INTERNAL_SERVER_ERROR, "lifecycle_error"),
            ApiError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        tracing::error!(error = %self, code, "request failed");

        (
            status,
            Json(ErrorBody { error: self.to_string(), code: code.to_string() }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
