//! In-memory entity store.
//!
//! Enforces the same uniqueness and referential rules as the Postgres schema,
//! with every check-and-insert done under a single write lock. Used by tests
//! and local simulations.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{
    Assessment, AssessmentResult, AssessmentWrite, AttendanceStatus, Certificate, NewCertificate,
    NewTrainingSession, NewTrainingStandard, SessionInstructor, SessionParticipant, SessionStatus,
    TrainingSession, TrainingStandard, UpdateTrainingStandard, User,
};

use super::error::{EngineError, EngineResult};
use super::store::{CertificateInsert, EntityStore};

type Pair = (Uuid, Uuid);

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, User>,
    standards: HashMap<Uuid, TrainingStandard>,
    sessions: HashMap<Uuid, TrainingSession>,
    instructors: BTreeMap<Pair, SessionInstructor>,
    participants: BTreeMap<Pair, SessionParticipant>,
    assessments: BTreeMap<Pair, Assessment>,
    certificates: HashMap<Uuid, Certificate>,
}

impl State {
    fn upsert_assessment(
        &mut self,
        session_id: Uuid,
        row: &AssessmentWrite,
        now: OffsetDateTime,
    ) -> EngineResult<Assessment> {
        self.check_assessment(session_id, row)?;

        let key = (session_id, row.participant_id);
        let assessment = self
            .assessments
            .entry(key)
            .and_modify(|existing| {
                existing.score = row.score;
                existing.result = row.result;
                existing.remarks = row.remarks.clone();
                existing.graded_by = Some(row.graded_by);
                existing.updated_at = now;
            })
            .or_insert_with(|| Assessment {
                id: Uuid::new_v4(),
                session_id,
                participant_id: row.participant_id,
                score: row.score,
                result: row.result,
                remarks: row.remarks.clone(),
                graded_by: Some(row.graded_by),
                created_at: now,
                updated_at: now,
            });

        Ok(assessment.clone())
    }

    fn check_assessment(&self, session_id: Uuid, row: &AssessmentWrite) -> EngineResult<()> {
        let participant_id = row.participant_id;
        if !self.participants.contains_key(&(session_id, participant_id)) {
            return Err(EngineError::ReferentialViolation {
                session_id,
                participant_id,
            });
        }
        if row.result != AssessmentResult::Pass
            && self.active_certificate(session_id, participant_id).is_some()
        {
            return Err(EngineError::ParticipantCertified {
                session_id,
                participant_id,
            });
        }
        Ok(())
    }

    fn active_certificate(&self, session_id: Uuid, participant_id: Uuid) -> Option<&Certificate> {
        self.certificates.values().find(|c| {
            c.session_id == session_id && c.participant_id == participant_id && !c.is_revoked()
        })
    }
}

/// In-memory store for testing.
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<State>,
    atomic_batches: bool,
    unavailable: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            atomic_batches: true,
            unavailable: AtomicBool::new(false),
        }
    }

    /// A store without multi-row atomicity; bulk writes apply row by row.
    #[must_use]
    pub fn without_atomic_batches() -> Self {
        Self {
            atomic_batches: false,
            ..Self::new()
        }
    }

    /// Register a user the way the identity service would.
    pub async fn add_user(&self, user_id: Uuid, organization_id: Option<Uuid>) {
        self.state.write().await.users.insert(
            user_id,
            User {
                id: user_id,
                organization_id,
            },
        );
    }

    /// Make every call fail with `StoreUnavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Seed a certificate directly, bypassing issuance rules.
    pub async fn seed_certificate(&self, certificate: Certificate) {
        self.state
            .write()
            .await
            .certificates
            .insert(certificate.id, certificate);
    }

    pub async fn participant_count(&self, session_id: Uuid) -> usize {
        self.state
            .read()
            .await
            .participants
            .keys()
            .filter(|(s, _)| *s == session_id)
            .count()
    }

    pub async fn assessment_count(&self, session_id: Uuid) -> usize {
        self.state
            .read()
            .await
            .assessments
            .keys()
            .filter(|(s, _)| *s == session_id)
            .count()
    }

    fn check_available(&self) -> EngineResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn get_user(&self, user_id: Uuid) -> EngineResult<Option<User>> {
        self.check_available()?;
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn insert_standard(&self, input: &NewTrainingStandard) -> EngineResult<TrainingStandard> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.standards.values().any(|s| s.code == input.code) {
            return Err(EngineError::Validation(format!(
                "training standard code '{}' is already in use",
                input.code
            )));
        }

        let now = OffsetDateTime::now_utc();
        let standard = TrainingStandard {
            id: Uuid::new_v4(),
            code: input.code.clone(),
            title: input.title.clone(),
            validity_months: input.validity_months,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.standards.insert(standard.id, standard.clone());
        Ok(standard)
    }

    async fn get_standard(&self, standard_id: Uuid) -> EngineResult<Option<TrainingStandard>> {
        self.check_available()?;
        Ok(self.state.read().await.standards.get(&standard_id).cloned())
    }

    async fn update_standard(
        &self,
        standard_id: Uuid,
        input: &UpdateTrainingStandard,
    ) -> EngineResult<Option<TrainingStandard>> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.sessions.values().any(|s| s.training_standard_id == standard_id) {
            return Err(EngineError::StandardInUse(standard_id));
        }

        let Some(standard) = state.standards.get_mut(&standard_id) else {
            return Ok(None);
        };
        if let Some(title) = &input.title {
            standard.title = title.clone();
        }
        if let Some(validity_months) = input.validity_months {
            standard.validity_months = validity_months;
        }
        standard.updated_at = OffsetDateTime::now_utc();
        Ok(Some(standard.clone()))
    }

    async fn set_standard_active(
        &self,
        standard_id: Uuid,
        is_active: bool,
    ) -> EngineResult<Option<TrainingStandard>> {
        self.check_available()?;
        let mut state = self.state.write().await;
        Ok(state.standards.get_mut(&standard_id).map(|standard| {
            standard.is_active = is_active;
            standard.updated_at = OffsetDateTime::now_utc();
            standard.clone()
        }))
    }

    async fn count_sessions_for_standard(&self, standard_id: Uuid) -> EngineResult<i64> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| s.training_standard_id == standard_id)
            .count() as i64)
    }

    async fn insert_session(&self, input: &NewTrainingSession) -> EngineResult<TrainingSession> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if !state.standards.contains_key(&input.training_standard_id) {
            return Err(EngineError::StandardNotFound(input.training_standard_id));
        }

        let now = OffsetDateTime::now_utc();
        let session = TrainingSession {
            id: Uuid::new_v4(),
            training_standard_id: input.training_standard_id,
            start_date: input.start_date,
            end_date: input.end_date,
            location: input.location.clone(),
            delivery_mode: input.delivery_mode,
            status: SessionStatus::Planned,
            created_at: now,
            updated_at: now,
        };
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: Uuid) -> EngineResult<Option<TrainingSession>> {
        self.check_available()?;
        Ok(self.state.read().await.sessions.get(&session_id).cloned())
    }

    async fn delete_session(&self, session_id: Uuid) -> EngineResult<bool> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.participants.keys().any(|(s, _)| *s == session_id) {
            return Err(EngineError::SessionHasParticipants(session_id));
        }
        state.instructors.retain(|(s, _), _| *s != session_id);
        Ok(state.sessions.remove(&session_id).is_some())
    }

    async fn compare_and_set_status(
        &self,
        session_id: Uuid,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> EngineResult<Option<TrainingSession>> {
        self.check_available()?;
        let mut state = self.state.write().await;
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.status == expected => {
                session.status = next;
                session.updated_at = OffsetDateTime::now_utc();
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_instructor(
        &self,
        session_id: Uuid,
        instructor_id: Uuid,
    ) -> EngineResult<SessionInstructor> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if !state.sessions.contains_key(&session_id) {
            return Err(EngineError::SessionNotFound(session_id));
        }
        if !state.users.contains_key(&instructor_id) {
            return Err(EngineError::UserNotFound(instructor_id));
        }
        if state.instructors.contains_key(&(session_id, instructor_id)) {
            return Err(EngineError::DuplicateAssignment {
                session_id,
                instructor_id,
            });
        }

        let assignment = SessionInstructor {
            session_id,
            instructor_id,
            assigned_at: OffsetDateTime::now_utc(),
        };
        state
            .instructors
            .insert((session_id, instructor_id), assignment.clone());
        Ok(assignment)
    }

    async fn delete_instructor(&self, session_id: Uuid, instructor_id: Uuid) -> EngineResult<bool> {
        self.check_available()?;
        let mut state = self.state.write().await;
        Ok(state.instructors.remove(&(session_id, instructor_id)).is_some())
    }

    async fn list_instructors(&self, session_id: Uuid) -> EngineResult<Vec<SessionInstructor>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .instructors
            .range((session_id, Uuid::nil())..=(session_id, Uuid::from_u128(u128::MAX)))
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn insert_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<SessionParticipant> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if !state.sessions.contains_key(&session_id) {
            return Err(EngineError::SessionNotFound(session_id));
        }
        if !state.users.contains_key(&participant_id) {
            return Err(EngineError::UserNotFound(participant_id));
        }
        if state.participants.contains_key(&(session_id, participant_id)) {
            return Err(EngineError::DuplicateEnrollment {
                session_id,
                participant_id,
            });
        }

        let now = OffsetDateTime::now_utc();
        let enrollment = SessionParticipant {
            session_id,
            participant_id,
            attendance_status: AttendanceStatus::Enrolled,
            enrolled_at: now,
            updated_at: now,
        };
        state
            .participants
            .insert((session_id, participant_id), enrollment.clone());
        Ok(enrollment)
    }

    async fn get_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<Option<SessionParticipant>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.participants.get(&(session_id, participant_id)).cloned())
    }

    async fn list_participants(&self, session_id: Uuid) -> EngineResult<Vec<SessionParticipant>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .participants
            .range((session_id, Uuid::nil())..=(session_id, Uuid::from_u128(u128::MAX)))
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn delete_participant(&self, session_id: Uuid, participant_id: Uuid) -> EngineResult<bool> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.active_certificate(session_id, participant_id).is_some() {
            return Err(EngineError::ParticipantCertified {
                session_id,
                participant_id,
            });
        }
        let key = (session_id, participant_id);
        state.assessments.remove(&key);
        Ok(state.participants.remove(&key).is_some())
    }

    async fn set_attendance(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        status: AttendanceStatus,
    ) -> EngineResult<Option<SessionParticipant>> {
        self.check_available()?;
        let mut state = self.state.write().await;
        Ok(state
            .participants
            .get_mut(&(session_id, participant_id))
            .map(|enrollment| {
                enrollment.attendance_status = status;
                enrollment.updated_at = OffsetDateTime::now_utc();
                enrollment.clone()
            }))
    }

    fn supports_atomic_batches(&self) -> bool {
        self.atomic_batches
    }

    async fn upsert_assessment(
        &self,
        session_id: Uuid,
        row: &AssessmentWrite,
    ) -> EngineResult<Assessment> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.upsert_assessment(session_id, row, OffsetDateTime::now_utc())
    }

    async fn upsert_assessments(
        &self,
        session_id: Uuid,
        rows: &[AssessmentWrite],
    ) -> EngineResult<Vec<Assessment>> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let now = OffsetDateTime::now_utc();

        if self.atomic_batches {
            for row in rows {
                state.check_assessment(session_id, row)?;
            }
        }

        rows.iter()
            .map(|row| state.upsert_assessment(session_id, row, now))
            .collect()
    }

    async fn get_assessment(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<Option<Assessment>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.assessments.get(&(session_id, participant_id)).cloned())
    }

    async fn list_assessments(&self, session_id: Uuid) -> EngineResult<Vec<Assessment>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .assessments
            .range((session_id, Uuid::nil())..=(session_id, Uuid::from_u128(u128::MAX)))
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn insert_certificate(&self, input: &NewCertificate) -> EngineResult<CertificateInsert> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if let Some(existing) = state.active_certificate(input.session_id, input.participant_id) {
            return Ok(CertificateInsert::AlreadyCertified(existing.clone()));
        }

        let key = (input.session_id, input.participant_id);
        let result = state.assessments.get(&key).map(|a| a.result);
        if !state.participants.contains_key(&key) || result != Some(AssessmentResult::Pass) {
            return Ok(CertificateInsert::NotEligible(result));
        }
        if state
            .certificates
            .values()
            .any(|c| c.certificate_code == input.certificate_code)
        {
            return Ok(CertificateInsert::CodeCollision);
        }

        let certificate = Certificate {
            id: Uuid::new_v4(),
            certificate_code: input.certificate_code.clone(),
            participant_id: input.participant_id,
            session_id: input.session_id,
            training_standard_id: input.training_standard_id,
            issue_date: input.issue_date,
            expiry_date: input.expiry_date,
            revoked_at: None,
            revocation_reason: None,
            created_at: OffsetDateTime::now_utc(),
        };
        state.certificates.insert(certificate.id, certificate.clone());
        Ok(CertificateInsert::Created(certificate))
    }

    async fn get_certificate(&self, certificate_id: Uuid) -> EngineResult<Option<Certificate>> {
        self.check_available()?;
        Ok(self.state.read().await.certificates.get(&certificate_id).cloned())
    }

    async fn find_certificate_by_code(&self, code: &str) -> EngineResult<Option<Certificate>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .certificates
            .values()
            .find(|c| c.certificate_code == code)
            .cloned())
    }

    async fn list_certificates_for_session(&self, session_id: Uuid) -> EngineResult<Vec<Certificate>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut certificates: Vec<_> = state
            .certificates
            .values()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect();
        certificates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(certificates)
    }

    async fn list_certificates_for_participant(
        &self,
        participant_id: Uuid,
    ) -> EngineResult<Vec<Certificate>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut certificates: Vec<_> = state
            .certificates
            .values()
            .filter(|c| c.participant_id == participant_id)
            .cloned()
            .collect();
        certificates.sort_by(|a, b| a.issue_date.cmp(&b.issue_date).then(a.id.cmp(&b.id)));
        Ok(certificates)
    }

    async fn list_certificates_for_organization(
        &self,
        organization_id: Uuid,
    ) -> EngineResult<Vec<Certificate>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut certificates: Vec<_> = state
            .certificates
            .values()
            .filter(|c| {
                state
                    .users
                    .get(&c.participant_id)
                    .is_some_and(|u| u.organization_id == Some(organization_id))
            })
            .cloned()
            .collect();
        certificates.sort_by(|a, b| a.expiry_date.cmp(&b.expiry_date).then(a.id.cmp(&b.id)));
        Ok(certificates)
    }

    async fn revoke_certificate(
        &self,
        certificate_id: Uuid,
        reason: &str,
        at: OffsetDateTime,
    ) -> EngineResult<Option<Certificate>> {
        self.check_available()?;
        let mut state = self.state.write().await;
        match state.certificates.get_mut(&certificate_id) {
            Some(certificate) if !certificate.is_revoked() => {
                certificate.revoked_at = Some(at);
                certificate.revocation_reason = Some(reason.to_string());
                Ok(Some(certificate.clone()))
            }
            _ => Ok(None),
        }
    }
}
