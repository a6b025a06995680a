use thiserror::Error;
use uuid::Uuid;

use crate::db::models::{AssessmentResult, SessionStatus};

/// Failure kinds surfaced by the training engine.
///
/// Store-specific failures never leak through here: the store adapters
/// translate uniqueness and referential violations into the matching kind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Instructor {instructor_id} is already assigned to session {session_id}")]
    DuplicateAssignment { session_id: Uuid, instructor_id: Uuid },

    #[error("Participant {participant_id} is already enrolled in session {session_id}")]
    DuplicateEnrollment { session_id: Uuid, participant_id: Uuid },

    #[error("Session cannot move from {current} to {requested}")]
    InvalidTransition {
        current: SessionStatus,
        requested: SessionStatus,
    },

    #[error("Session {session_id} kept changing under {attempts} transition attempts")]
    TransitionContended { session_id: Uuid, attempts: u32 },

    #[error("Participant {participant_id} is not enrolled in session {session_id}")]
    ReferentialViolation { session_id: Uuid, participant_id: Uuid },

    #[error("Score {score} is outside the accepted range 0-100")]
    InvalidScore { score: f64 },

    #[error("Session {session_id} is {status}; certificates require a completed session")]
    SessionNotCompleted {
        session_id: Uuid,
        status: SessionStatus,
    },

    #[error("Participant {participant_id} is not eligible for a certificate (assessment result: {result:?})")]
    NotEligible {
        participant_id: Uuid,
        result: Option<AssessmentResult>,
    },

    #[error("Session {session_id} is {status} and no longer accepts roster changes")]
    SessionClosed {
        session_id: Uuid,
        status: SessionStatus,
    },

    #[error("Session {0} has enrolled participants; cancel it instead of deleting")]
    SessionHasParticipants(Uuid),

    #[error("Participant {participant_id} holds a certificate from session {session_id}; revoke it before removing or failing them")]
    ParticipantCertified { session_id: Uuid, participant_id: Uuid },

    #[error("Training standard {0} is referenced by sessions and can no longer be edited")]
    StandardInUse(Uuid),

    #[error("Training standard {0} is inactive")]
    StandardInactive(Uuid),

    #[error("Certificate {0} is already revoked")]
    CertificateAlreadyRevoked(Uuid),

    #[error("Could not allocate a unique certificate code after {attempts} attempts")]
    CertificateCodeExhausted { attempts: u32 },

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Training standard not found: {0}")]
    StandardNotFound(Uuid),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Certificate not found: {0}")]
    CertificateNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Entity store unavailable: {0}")]
    StoreUnavailable(String),
}

impl EngineError {
    /// Stable machine-readable name for the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::DuplicateAssignment { .. } => "duplicate_assignment",
            EngineError::DuplicateEnrollment { .. } => "duplicate_enrollment",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::TransitionContended { .. } => "transition_contended",
            EngineError::ReferentialViolation { .. } => "referential_violation",
            EngineError::InvalidScore { .. } => "invalid_score",
            EngineError::SessionNotCompleted { .. } => "session_not_completed",
            EngineError::NotEligible { .. } => "not_eligible",
            EngineError::SessionClosed { .. } => "session_closed",
            EngineError::SessionHasParticipants(_) => "session_has_participants",
            EngineError::ParticipantCertified { .. } => "participant_certified",
            EngineError::StandardInUse(_) => "standard_in_use",
            EngineError::StandardInactive(_) => "standard_inactive",
            EngineError::CertificateAlreadyRevoked(_) => "certificate_already_revoked",
            EngineError::CertificateCodeExhausted { .. } => "certificate_code_exhausted",
            EngineError::SessionNotFound(_) => "session_not_found",
            EngineError::StandardNotFound(_) => "standard_not_found",
            EngineError::UserNotFound(_) => "user_not_found",
            EngineError::CertificateNotFound(_) => "certificate_not_found",
            EngineError::Validation(_) => "validation",
            EngineError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// Duplicates are expected outcomes of concurrent roster edits.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            EngineError::DuplicateAssignment { .. } | EngineError::DuplicateEnrollment { .. }
        )
    }

    /// Transient store failures and contended transitions are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StoreUnavailable(_) | EngineError::TransitionContended { .. }
        )
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(errors: validator::ValidationErrors) -> Self {
        EngineError::Validation(errors.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
