use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::models::{
    Assessment, AssessmentResult, AssessmentWrite, AttendanceStatus, Certificate, NewCertificate,
    NewTrainingSession, NewTrainingStandard, SessionInstructor, SessionParticipant, SessionStatus,
    TrainingSession, TrainingStandard, UpdateTrainingStandard, User,
};

use super::error::EngineResult;

/// Result of a conditional certificate insert.
#[derive(Debug, Clone, PartialEq)]
pub enum CertificateInsert {
    Created(Certificate),
    /// A non-revoked certificate already exists for the (session, participant) pair.
    AlreadyCertified(Certificate),
    /// The generated code is taken; the caller should retry with a fresh one.
    CodeCollision,
    /// At insert time the participant was not enrolled or held no passing
    /// assessment. Carries the stored result, if any.
    NotEligible(Option<AssessmentResult>),
}

/// Durable records the engine reads and writes.
///
/// Uniqueness is the store's job: inserts that would duplicate a
/// (session, participant) or (session, instructor) pair fail with the
/// matching `Duplicate*` error rather than relying on a prior read.
#[async_trait]
pub trait EntityStore: Send + Sync {
    // Users (owned by the identity service)
    async fn get_user(&self, user_id: Uuid) -> EngineResult<Option<User>>;

    // Training standards
    async fn insert_standard(&self, input: &NewTrainingStandard) -> EngineResult<TrainingStandard>;
    async fn get_standard(&self, standard_id: Uuid) -> EngineResult<Option<TrainingStandard>>;
    async fn update_standard(
        &self,
        standard_id: Uuid,
        input: &UpdateTrainingStandard,
    ) -> EngineResult<Option<TrainingStandard>>;
    async fn set_standard_active(
        &self,
        standard_id: Uuid,
        is_active: bool,
    ) -> EngineResult<Option<TrainingStandard>>;
    async fn count_sessions_for_standard(&self, standard_id: Uuid) -> EngineResult<i64>;

    // Sessions
    async fn insert_session(&self, input: &NewTrainingSession) -> EngineResult<TrainingSession>;
    async fn get_session(&self, session_id: Uuid) -> EngineResult<Option<TrainingSession>>;
    /// Fails with `SessionHasParticipants` when any enrollment exists.
    async fn delete_session(&self, session_id: Uuid) -> EngineResult<bool>;
    /// Applies `next` only if the stored status still equals `expected`.
    async fn compare_and_set_status(
        &self,
        session_id: Uuid,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> EngineResult<Option<TrainingSession>>;

    // Instructors
    async fn insert_instructor(
        &self,
        session_id: Uuid,
        instructor_id: Uuid,
    ) -> EngineResult<SessionInstructor>;
    async fn delete_instructor(&self, session_id: Uuid, instructor_id: Uuid) -> EngineResult<bool>;
    async fn list_instructors(&self, session_id: Uuid) -> EngineResult<Vec<SessionInstructor>>;

    // Participants
    async fn insert_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<SessionParticipant>;
    async fn get_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<Option<SessionParticipant>>;
    async fn list_participants(&self, session_id: Uuid) -> EngineResult<Vec<SessionParticipant>>;
    /// Removes the enrollment together with its assessment. Fails with
    /// `ParticipantCertified` when a non-revoked certificate exists, checked
    /// atomically with the delete.
    async fn delete_participant(&self, session_id: Uuid, participant_id: Uuid) -> EngineResult<bool>;
    async fn set_attendance(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        status: AttendanceStatus,
    ) -> EngineResult<Option<SessionParticipant>>;

    // Assessments
    /// Whether `upsert_assessments` commits all rows or none.
    fn supports_atomic_batches(&self) -> bool;
    /// Fails with `ReferentialViolation` when the participant is not enrolled,
    /// and with `ParticipantCertified` when a non-pass result would be written
    /// over a participant holding a non-revoked certificate.
    async fn upsert_assessment(
        &self,
        session_id: Uuid,
        row: &AssessmentWrite,
    ) -> EngineResult<Assessment>;
    async fn upsert_assessments(
        &self,
        session_id: Uuid,
        rows: &[AssessmentWrite],
    ) -> EngineResult<Vec<Assessment>>;
    async fn get_assessment(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<Option<Assessment>>;
    async fn list_assessments(&self, session_id: Uuid) -> EngineResult<Vec<Assessment>>;

    // Certificates
    /// Inserts only if, at that moment, the participant is enrolled, holds a
    /// passing assessment and has no non-revoked certificate for the session.
    async fn insert_certificate(&self, input: &NewCertificate) -> EngineResult<CertificateInsert>;
    async fn get_certificate(&self, certificate_id: Uuid) -> EngineResult<Option<Certificate>>;
    async fn find_certificate_by_code(&self, code: &str) -> EngineResult<Option<Certificate>>;
    async fn list_certificates_for_session(&self, session_id: Uuid) -> EngineResult<Vec<Certificate>>;
    async fn list_certificates_for_participant(
        &self,
        participant_id: Uuid,
    ) -> EngineResult<Vec<Certificate>>;
    async fn list_certificates_for_organization(
        &self,
        organization_id: Uuid,
    ) -> EngineResult<Vec<Certificate>>;
    /// Returns `None` when the certificate is missing or already revoked.
    async fn revoke_certificate(
        &self,
        certificate_id: Uuid,
        reason: &str,
        at: OffsetDateTime,
    ) -> EngineResult<Option<Certificate>>;
}
