//! Postgres-backed entity store.
//!
//! Uniqueness and referential rules live in the schema; this adapter turns
//! the violated constraint into the matching engine error.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use tracing::error;
use uuid::Uuid;

use crate::db::error::DatabaseError;
use crate::db::models::{
    Assessment, AssessmentResult, AssessmentWrite, AttendanceStatus, Certificate, NewCertificate,
    NewTrainingSession, NewTrainingStandard, SessionInstructor, SessionParticipant, SessionStatus,
    TrainingSession, TrainingStandard, UpdateTrainingStandard, User,
};
use crate::db::repositories::{
    AssessmentRepository, CertificateRepository, RosterRepository, RowLock, SessionRepository,
    StandardRepository, UserRepository,
};
use crate::engine::{CertificateInsert, EngineError, EngineResult, EntityStore};

/// Falls back for failures no constraint explains.
fn unexpected(err: DatabaseError) -> EngineError {
    if !err.is_connection() {
        error!(error = %err, constraint = ?err.constraint(), "Unexpected database error");
    }
    EngineError::StoreUnavailable(err.to_string())
}

fn db_err(err: sqlx::Error) -> EngineError {
    unexpected(DatabaseError::from(err))
}

#[derive(Debug, Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn get_user(&self, user_id: Uuid) -> EngineResult<Option<User>> {
        UserRepository::get_user_by_id(&self.pool, user_id)
            .await
            .map_err(db_err)
    }

    async fn insert_standard(&self, input: &NewTrainingStandard) -> EngineResult<TrainingStandard> {
        StandardRepository::create_standard(&self.pool, input)
            .await
            .map_err(|err| match DatabaseError::from(err) {
                DatabaseError::UniqueViolation { .. } => EngineError::Validation(format!(
                    "training standard code '{}' is already in use",
                    input.code
                )),
                DatabaseError::CheckViolation { constraint } => {
                    EngineError::Validation(format!("training standard violates {}", constraint))
                }
                other => unexpected(other),
            })
    }

    async fn get_standard(&self, standard_id: Uuid) -> EngineResult<Option<TrainingStandard>> {
        StandardRepository::get_standard_by_id(&self.pool, standard_id)
            .await
            .map_err(db_err)
    }

    async fn update_standard(
        &self,
        standard_id: Uuid,
        input: &UpdateTrainingStandard,
    ) -> EngineResult<Option<TrainingStandard>> {
        if let Some(updated) =
            StandardRepository::update_unreferenced_standard(&self.pool, standard_id, input)
                .await
                .map_err(db_err)?
        {
            return Ok(Some(updated));
        }

        // Nothing updated: either the standard is missing or a session references it.
        match self.get_standard(standard_id).await? {
            Some(_) => Err(EngineError::StandardInUse(standard_id)),
            None => Ok(None),
        }
    }

    async fn set_standard_active(
        &self,
        standard_id: Uuid,
        is_active: bool,
    ) -> EngineResult<Option<TrainingStandard>> {
        StandardRepository::set_active(&self.pool, standard_id, is_active)
            .await
            .map_err(db_err)
    }

    async fn count_sessions_for_standard(&self, standard_id: Uuid) -> EngineResult<i64> {
        StandardRepository::count_sessions(&self.pool, standard_id)
            .await
            .map_err(db_err)
    }

    async fn insert_session(&self, input: &NewTrainingSession) -> EngineResult<TrainingSession> {
        SessionRepository::create_session(&self.pool, input)
            .await
            .map_err(|err| match DatabaseError::from(err) {
                DatabaseError::ForeignKeyViolation { .. } => {
                    EngineError::StandardNotFound(input.training_standard_id)
                }
                DatabaseError::CheckViolation { .. } => {
                    EngineError::Validation("session end date precedes its start date".to_string())
                }
                other => unexpected(other),
            })
    }

    async fn get_session(&self, session_id: Uuid) -> EngineResult<Option<TrainingSession>> {
        SessionRepository::get_session_by_id(&self.pool, session_id)
            .await
            .map_err(db_err)
    }

    async fn delete_session(&self, session_id: Uuid) -> EngineResult<bool> {
        SessionRepository::delete_session(&self.pool, session_id)
            .await
            .map_err(|err| match DatabaseError::from(err) {
                // Enrollments (or certificates issued from them) restrict the delete.
                DatabaseError::ForeignKeyViolation { .. } => {
                    EngineError::SessionHasParticipants(session_id)
                }
                other => unexpected(other),
            })
    }

    async fn compare_and_set_status(
        &self,
        session_id: Uuid,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> EngineResult<Option<TrainingSession>> {
        SessionRepository::compare_and_set_status(&self.pool, session_id, expected, next)
            .await
            .map_err(db_err)
    }

    async fn insert_instructor(
        &self,
        session_id: Uuid,
        instructor_id: Uuid,
    ) -> EngineResult<SessionInstructor> {
        RosterRepository::add_instructor(&self.pool, session_id, instructor_id)
            .await
            .map_err(|err| match DatabaseError::from(err) {
                DatabaseError::UniqueViolation { .. } => EngineError::DuplicateAssignment {
                    session_id,
                    instructor_id,
                },
                DatabaseError::ForeignKeyViolation { constraint }
                    if constraint.ends_with("_session_id_fkey") =>
                {
                    EngineError::SessionNotFound(session_id)
                }
                DatabaseError::ForeignKeyViolation { .. } => EngineError::UserNotFound(instructor_id),
                other => unexpected(other),
            })
    }

    async fn delete_instructor(&self, session_id: Uuid, instructor_id: Uuid) -> EngineResult<bool> {
        RosterRepository::remove_instructor(&self.pool, session_id, instructor_id)
            .await
            .map_err(db_err)
    }

    async fn list_instructors(&self, session_id: Uuid) -> EngineResult<Vec<SessionInstructor>> {
        RosterRepository::list_instructors(&self.pool, session_id)
            .await
            .map_err(db_err)
    }

    async fn insert_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<SessionParticipant> {
        RosterRepository::add_participant(&self.pool, session_id, participant_id)
            .await
            .map_err(|err| match DatabaseError::from(err) {
                DatabaseError::UniqueViolation { .. } => EngineError::DuplicateEnrollment {
                    session_id,
                    participant_id,
                },
                DatabaseError::ForeignKeyViolation { constraint }
                    if constraint.ends_with("_session_id_fkey") =>
                {
                    EngineError::SessionNotFound(session_id)
                }
                DatabaseError::ForeignKeyViolation { .. } => EngineError::UserNotFound(participant_id),
                other => unexpected(other),
            })
    }

    async fn get_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<Option<SessionParticipant>> {
        RosterRepository::get_participant(&self.pool, session_id, participant_id)
            .await
            .map_err(db_err)
    }

    async fn list_participants(&self, session_id: Uuid) -> EngineResult<Vec<SessionParticipant>> {
        RosterRepository::list_participants(&self.pool, session_id)
            .await
            .map_err(db_err)
    }

    async fn delete_participant(&self, session_id: Uuid, participant_id: Uuid) -> EngineResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Waits out any issuance holding the enrollment, then sees its certificate.
        RosterRepository::lock_participant(&mut *tx, session_id, participant_id, RowLock::Update)
            .await
            .map_err(db_err)?;
        if CertificateRepository::get_active_certificate(&mut *tx, session_id, participant_id)
            .await
            .map_err(db_err)?
            .is_some()
        {
            return Err(EngineError::ParticipantCertified {
                session_id,
                participant_id,
            });
        }

        let removed = RosterRepository::remove_participant(&mut *tx, session_id, participant_id)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(removed)
    }

    async fn set_attendance(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        status: AttendanceStatus,
    ) -> EngineResult<Option<SessionParticipant>> {
        RosterRepository::set_attendance(&self.pool, session_id, participant_id, status)
            .await
            .map_err(db_err)
    }

    fn supports_atomic_batches(&self) -> bool {
        true
    }

    async fn upsert_assessment(
        &self,
        session_id: Uuid,
        row: &AssessmentWrite,
    ) -> EngineResult<Assessment> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let assessment = guarded_upsert(&mut *tx, session_id, row).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(assessment)
    }

    async fn upsert_assessments(
        &self,
        session_id: Uuid,
        rows: &[AssessmentWrite],
    ) -> EngineResult<Vec<Assessment>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            // Dropping `tx` on the error path rolls the whole batch back.
            written.push(guarded_upsert(&mut *tx, session_id, row).await?);
        }

        tx.commit().await.map_err(db_err)?;
        Ok(written)
    }

    async fn get_assessment(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<Option<Assessment>> {
        AssessmentRepository::get_assessment(&self.pool, session_id, participant_id)
            .await
            .map_err(db_err)
    }

    async fn list_assessments(&self, session_id: Uuid) -> EngineResult<Vec<Assessment>> {
        AssessmentRepository::list_assessments(&self.pool, session_id)
            .await
            .map_err(db_err)
    }

    async fn insert_certificate(&self, input: &NewCertificate) -> EngineResult<CertificateInsert> {
        let (session_id, participant_id) = (input.session_id, input.participant_id);
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Held until commit: removal and failing regrades queue behind it.
        let enrolled =
            RosterRepository::lock_participant(&mut *tx, session_id, participant_id, RowLock::Share)
                .await
                .map_err(db_err)?;

        if let Some(existing) =
            CertificateRepository::get_active_certificate(&mut *tx, session_id, participant_id)
                .await
                .map_err(db_err)?
        {
            return Ok(CertificateInsert::AlreadyCertified(existing));
        }

        let result = AssessmentRepository::get_assessment(&mut *tx, session_id, participant_id)
            .await
            .map_err(db_err)?
            .map(|a| a.result);
        if !enrolled || result != Some(AssessmentResult::Pass) {
            return Ok(CertificateInsert::NotEligible(result));
        }

        if let Some(created) = CertificateRepository::insert_if_absent(&mut *tx, input)
            .await
            .map_err(db_err)?
        {
            tx.commit().await.map_err(db_err)?;
            return Ok(CertificateInsert::Created(created));
        }

        // Lost to a concurrent insert for the pair, or the code is taken.
        match CertificateRepository::get_active_certificate(&mut *tx, session_id, participant_id)
            .await
            .map_err(db_err)?
        {
            Some(existing) => Ok(CertificateInsert::AlreadyCertified(existing)),
            None => Ok(CertificateInsert::CodeCollision),
        }
    }

    async fn get_certificate(&self, certificate_id: Uuid) -> EngineResult<Option<Certificate>> {
        CertificateRepository::get_certificate_by_id(&self.pool, certificate_id)
            .await
            .map_err(db_err)
    }

    async fn find_certificate_by_code(&self, code: &str) -> EngineResult<Option<Certificate>> {
        CertificateRepository::get_certificate_by_code(&self.pool, code)
            .await
            .map_err(db_err)
    }

    async fn list_certificates_for_session(&self, session_id: Uuid) -> EngineResult<Vec<Certificate>> {
        CertificateRepository::list_by_session(&self.pool, session_id)
            .await
            .map_err(db_err)
    }

    async fn list_certificates_for_participant(
        &self,
        participant_id: Uuid,
    ) -> EngineResult<Vec<Certificate>> {
        CertificateRepository::list_by_participant(&self.pool, participant_id)
            .await
            .map_err(db_err)
    }

    async fn list_certificates_for_organization(
        &self,
        organization_id: Uuid,
    ) -> EngineResult<Vec<Certificate>> {
        CertificateRepository::list_by_organization(&self.pool, organization_id)
            .await
            .map_err(db_err)
    }

    async fn revoke_certificate(
        &self,
        certificate_id: Uuid,
        reason: &str,
        at: OffsetDateTime,
    ) -> EngineResult<Option<Certificate>> {
        CertificateRepository::revoke(&self.pool, certificate_id, reason, at)
            .await
            .map_err(db_err)
    }
}

/// Upserts one assessment inside `conn`'s transaction. A non-pass result
/// takes the enrollment lock first and is refused while the participant
/// holds a live certificate.
async fn guarded_upsert(
    conn: &mut PgConnection,
    session_id: Uuid,
    row: &AssessmentWrite,
) -> EngineResult<Assessment> {
    let participant_id = row.participant_id;
    if row.result != AssessmentResult::Pass {
        let enrolled =
            RosterRepository::lock_participant(&mut *conn, session_id, participant_id, RowLock::Update)
                .await
                .map_err(db_err)?;
        if !enrolled {
            return Err(EngineError::ReferentialViolation {
                session_id,
                participant_id,
            });
        }
        if CertificateRepository::get_active_certificate(&mut *conn, session_id, participant_id)
            .await
            .map_err(db_err)?
            .is_some()
        {
            return Err(EngineError::ParticipantCertified {
                session_id,
                participant_id,
            });
        }
    }

    AssessmentRepository::upsert_assessment(&mut *conn, session_id, row)
        .await
        .map_err(|err| assessment_error(session_id, participant_id, err))
}

fn assessment_error(session_id: Uuid, participant_id: Uuid, err: sqlx::Error) -> EngineError {
    match DatabaseError::from(err) {
        DatabaseError::ForeignKeyViolation { .. } => EngineError::ReferentialViolation {
            session_id,
            participant_id,
        },
        DatabaseError::CheckViolation { .. } => EngineError::Validation(format!(
            "assessment for participant {} is out of range",
            participant_id
        )),
        other => unexpected(other),
    }
}
