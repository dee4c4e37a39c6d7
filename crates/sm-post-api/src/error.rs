//! Social media post service: API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sm_post_core::error::DomainError;
use thiserror::Error;
use tracing::error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Tracing or span export could not be set up.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Wiring the event store, broker or projector failed.
    #[error("startup error: {0}")]
    Startup(#[from] DomainError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `DomainError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            DomainError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            DomainError::InvalidState(_) => (StatusCode::CONFLICT, "invalid_state"),
            DomainError::ConcurrencyConflict { .. } => {
                (StatusCode::CONFLICT, "concurrency_conflict")
            }
            DomainError::PermissionDenied(_) => (StatusCode::FORBIDDEN, "permission_denied"),
            DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            DomainError::AggregateNotFound(_) => (StatusCode::NOT_FOUND, "aggregate_not_found"),
            DomainError::Publication { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "publication_error")
            }
            DomainError::HandlerNotFound(_)
            | DomainError::AlreadyRegistered(_)
            | DomainError::UnknownEventKind(_)
            | DomainError::Serialization(_)
            | DomainError::ProjectionPending(_)
            | DomainError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use sm_post_core::repository::ExpectedVersion;
    use uuid::Uuid;

    fn status_of(err: DomainError) -> StatusCode {
        let response = ApiError(err).into_response();
        response.status()
    }

    #[test]
    fn test_invalid_argument_maps_to_400() {
        assert_eq!(
            status_of(DomainError::InvalidArgument("blank message".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_invalid_state_and_conflict_map_to_409() {
        assert_eq!(
            status_of(DomainError::InvalidState("post deleted".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DomainError::ConcurrencyConflict {
                aggregate_id: Uuid::new_v4(),
                expected: ExpectedVersion::Exact(1),
                actual: 2,
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_permission_denied_maps_to_403() {
        assert_eq!(
            status_of(DomainError::PermissionDenied("not the author".into())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_not_found_errors_map_to_404() {
        assert_eq!(
            status_of(DomainError::AggregateNotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DomainError::NotFound("comment".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_internal_failures_map_to_500() {
        assert_eq!(
            status_of(DomainError::Infrastructure("db down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(DomainError::HandlerNotFound("NewPost".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(DomainError::Publication {
                aggregate_id: Uuid::new_v4(),
                version: 1,
                reason: "broker unavailable".into(),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
