use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Engine(err) => engine_status(err),
            AppError::Database(err) if err.is_connection() => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Engine(err) => err.kind(),
            AppError::Database(_) => "database",
            AppError::Authentication(_) => "authentication",
            AppError::Authorization(_) => "authorization",
            AppError::BadRequest(_) => "bad_request",
        }
    }
}

fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::DuplicateAssignment { .. }
        | EngineError::DuplicateEnrollment { .. }
        | EngineError::InvalidTransition { .. }
        | EngineError::TransitionContended { .. }
        | EngineError::SessionNotCompleted { .. }
        | EngineError::SessionClosed { .. }
        | EngineError::SessionHasParticipants(_)
        | EngineError::ParticipantCertified { .. }
        | EngineError::StandardInUse(_)
        | EngineError::StandardInactive(_)
        | EngineError::CertificateAlreadyRevoked(_) => StatusCode::CONFLICT,

        EngineError::ReferentialViolation { .. }
        | EngineError::InvalidScore { .. }
        | EngineError::NotEligible { .. }
        | EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,

        EngineError::SessionNotFound(_)
        | EngineError::StandardNotFound(_)
        | EngineError::UserNotFound(_)
        | EngineError::CertificateNotFound(_) => StatusCode::NOT_FOUND,

        EngineError::CertificateCodeExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        EngineError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        }

        // Store internals stay out of the response body.
        let message = match &self {
            AppError::Database(_) | AppError::Engine(EngineError::StoreUnavailable(_)) => {
                "The training store is temporarily unavailable; retry shortly".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "kind": self.kind(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SessionStatus;
    use uuid::Uuid;

    #[test]
    fn test_engine_kinds_map_to_statuses() {
        let id = Uuid::new_v4();

        assert_eq!(
            AppError::from(EngineError::DuplicateEnrollment {
                session_id: id,
                participant_id: id
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(EngineError::InvalidTransition {
                current: SessionStatus::Completed,
                requested: SessionStatus::Active,
            })
            .status(),
            StatusCode::CONFLICT
        );
        let contended = EngineError::TransitionContended {
            session_id: id,
            attempts: 3,
        };
        assert!(contended.is_retryable());
        assert_eq!(AppError::from(contended).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(EngineError::InvalidScore { score: 120.0 }).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(EngineError::SessionNotFound(id)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(EngineError::StoreUnavailable("timeout".to_string())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_kind_is_exposed() {
        let err = AppError::from(EngineError::NotEligible {
            participant_id: Uuid::new_v4(),
            result: None,
        });
        assert_eq!(err.kind(), "not_eligible");
    }
}
