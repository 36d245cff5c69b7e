//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use engine::{EngineError, SettingsError, StoreError, TransitionFailure};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable `x-user-id` header.
    #[error("missing or malformed x-user-id header")]
    MissingActor,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    /// The form is outside its availability window.
    #[error("{0}")]
    Closed(String),

    /// Every application of a transition batch failed.
    #[error("{message}")]
    BatchFailed {
        message: String,
        failures: Vec<TransitionFailure>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<TransitionFailure>,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::MissingActor => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Self::Closed(_) => (StatusCode::CONFLICT, "closed"),
            Self::BatchFailed { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "batch_failed"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        let message = self.to_string();
        let failures = match self {
            Self::BatchFailed { failures, .. } => failures,
            _ => Vec::new(),
        };
        let body = ErrorBody {
            error: code,
            message,
            failures,
        };
        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::UnknownStage { .. }
            | EngineError::InvalidTemplate(_)
            | EngineError::Validation(_) => Self::BadRequest(message),
            EngineError::Unauthorized { .. } => Self::Forbidden(message),
            EngineError::TemplateClosed(_) => Self::Closed(message),
            EngineError::BatchFailed { failures, .. } => Self::BatchFailed { message, failures },
            EngineError::Store(StoreError::NotFound { .. }) => Self::NotFound(message),
            EngineError::Store(StoreError::Backend(_)) => Self::Internal(message),
        }
    }
}

impl From<criteria::CriteriaError> for ApiError {
    fn from(err: criteria::CriteriaError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        Self::Internal(err.to_string())
    }
}
