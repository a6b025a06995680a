//! Shared fixture for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aviation_training_backend::db::models::{
    Assessment, AssessmentInput, AssessmentResult, AssessmentWrite, AttendanceStatus, Certificate,
    DeliveryMode, NewCertificate, NewTrainingSession, NewTrainingStandard, SessionInstructor,
    SessionParticipant, SessionStatus, TrainingSession, TrainingStandard, UpdateTrainingStandard,
    User,
};
use aviation_training_backend::engine::{
    Actor, CertificateInsert, EngineResult, EngineSettings, EntityStore, FixedClock,
    InMemoryStore, Role, TrainingEngine,
};
use time::macros::{date, datetime};
use time::OffsetDateTime;
use uuid::Uuid;

pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub engine: TrainingEngine,
    pub admin: Actor,
    pub instructor: Actor,
    pub organization_id: Uuid,
    pub standard: TrainingStandard,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_store(InMemoryStore::new()).await
    }

    pub async fn with_store(store: InMemoryStore) -> Self {
        let store = Arc::new(store);
        Self::build(store.clone(), store).await
    }

    /// Runs the engine over `interleaved`; `store` still reaches the records underneath.
    pub async fn over(interleaved: Arc<InterleavedStore>) -> Self {
        Self::build(interleaved.inner.clone(), interleaved).await
    }

    async fn build(store: Arc<InMemoryStore>, engine_store: Arc<dyn EntityStore>) -> Self {
        let clock = Arc::new(FixedClock::new(datetime!(2025-06-02 09:00 UTC)));
        let engine = TrainingEngine::new(engine_store, clock.clone(), EngineSettings::default());

        let admin = Actor::new(Uuid::new_v4(), Role::PlatformAdmin);
        let instructor = Actor::new(Uuid::new_v4(), Role::Instructor);
        let organization_id = Uuid::new_v4();
        store.add_user(instructor.user_id, Some(organization_id)).await;

        let standard = engine
            .catalog
            .create_standard(
                NewTrainingStandard {
                    code: "CRM-1".to_string(),
                    title: "Crew Resource Management".to_string(),
                    validity_months: 24,
                },
                &admin,
            )
            .await
            .unwrap()
            .into_value();

        Self {
            store,
            clock,
            engine,
            admin,
            instructor,
            organization_id,
            standard,
        }
    }

    /// A user in the context's organization.
    pub async fn trainee(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.store.add_user(id, Some(self.organization_id)).await;
        id
    }

    pub async fn planned_session(&self) -> TrainingSession {
        self.engine
            .lifecycle
            .create_session(
                NewTrainingSession {
                    training_standard_id: self.standard.id,
                    start_date: date!(2025 - 06 - 02),
                    end_date: date!(2025 - 06 - 04),
                    location: Some("Sim Centre Bay 3".to_string()),
                    delivery_mode: DeliveryMode::InPerson,
                },
                &self.admin,
            )
            .await
            .unwrap()
            .into_value()
    }

    pub async fn enroll(&self, session_id: Uuid, participant_id: Uuid) {
        self.engine
            .roster
            .enroll_participant(session_id, participant_id, &self.admin)
            .await
            .unwrap();
    }

    pub async fn grade(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        score: Option<f64>,
        result: AssessmentResult,
    ) {
        self.engine
            .assessments
            .record_assessment(
                session_id,
                AssessmentInput {
                    participant_id,
                    score,
                    result: Some(result),
                    remarks: None,
                },
                &self.instructor,
            )
            .await
            .unwrap();
    }

    pub async fn move_to(&self, session_id: Uuid, status: SessionStatus) {
        self.engine
            .lifecycle
            .transition(session_id, status, &self.admin)
            .await
            .unwrap();
    }

    /// Drives a session through delivery to `completed`.
    pub async fn complete(&self, session_id: Uuid) {
        self.move_to(session_id, SessionStatus::Active).await;
        self.move_to(session_id, SessionStatus::Completed).await;
    }
}

/// Delegates to an in-memory store while letting a test widen race windows:
/// assessment listings are held back after reading, and status swaps can be
/// made to lose as if another writer got there first.
pub struct InterleavedStore {
    pub inner: Arc<InMemoryStore>,
    assessment_delay_ms: AtomicU64,
    lost_status_swaps: AtomicU32,
}

impl InterleavedStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner: Arc::new(inner),
            assessment_delay_ms: AtomicU64::new(0),
            lost_status_swaps: AtomicU32::new(0),
        }
    }

    /// Assessment listings return a snapshot taken `delay` earlier.
    pub fn hold_assessment_listings(&self, delay: Duration) {
        self.assessment_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// The next `count` status swaps report a lost race without writing.
    pub fn lose_status_swaps(&self, count: u32) {
        self.lost_status_swaps.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntityStore for InterleavedStore {
    async fn get_user(&self, user_id: Uuid) -> EngineResult<Option<User>> {
        self.inner.get_user(user_id).await
    }

    async fn insert_standard(&self, input: &NewTrainingStandard) -> EngineResult<TrainingStandard> {
        self.inner.insert_standard(input).await
    }

    async fn get_standard(&self, standard_id: Uuid) -> EngineResult<Option<TrainingStandard>> {
        self.inner.get_standard(standard_id).await
    }

    async fn update_standard(
        &self,
        standard_id: Uuid,
        input: &UpdateTrainingStandard,
    ) -> EngineResult<Option<TrainingStandard>> {
        self.inner.update_standard(standard_id, input).await
    }

    async fn set_standard_active(
        &self,
        standard_id: Uuid,
        is_active: bool,
    ) -> EngineResult<Option<TrainingStandard>> {
        self.inner.set_standard_active(standard_id, is_active).await
    }

    async fn count_sessions_for_standard(&self, standard_id: Uuid) -> EngineResult<i64> {
        self.inner.count_sessions_for_standard(standard_id).await
    }

    async fn insert_session(&self, input: &NewTrainingSession) -> EngineResult<TrainingSession> {
        self.inner.insert_session(input).await
    }

    async fn get_session(&self, session_id: Uuid) -> EngineResult<Option<TrainingSession>> {
        self.inner.get_session(session_id).await
    }

    async fn delete_session(&self, session_id: Uuid) -> EngineResult<bool> {
        self.inner.delete_session(session_id).await
    }

    async fn compare_and_set_status(
        &self,
        session_id: Uuid,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> EngineResult<Option<TrainingSession>> {
        let lost = self
            .lost_status_swaps
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return Ok(None);
        }
        self.inner
            .compare_and_set_status(session_id, expected, next)
            .await
    }

    async fn insert_instructor(
        &self,
        session_id: Uuid,
        instructor_id: Uuid,
    ) -> EngineResult<SessionInstructor> {
        self.inner.insert_instructor(session_id, instructor_id).await
    }

    async fn delete_instructor(&self, session_id: Uuid, instructor_id: Uuid) -> EngineResult<bool> {
        self.inner.delete_instructor(session_id, instructor_id).await
    }

    async fn list_instructors(&self, session_id: Uuid) -> EngineResult<Vec<SessionInstructor>> {
        self.inner.list_instructors(session_id).await
    }

    async fn insert_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<SessionParticipant> {
        self.inner.insert_participant(session_id, participant_id).await
    }

    async fn get_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<Option<SessionParticipant>> {
        self.inner.get_participant(session_id, participant_id).await
    }

    async fn list_participants(&self, session_id: Uuid) -> EngineResult<Vec<SessionParticipant>> {
        self.inner.list_participants(session_id).await
    }

    async fn delete_participant(&self, session_id: Uuid, participant_id: Uuid) -> EngineResult<bool> {
        self.inner.delete_participant(session_id, participant_id).await
    }

    async fn set_attendance(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        status: AttendanceStatus,
    ) -> EngineResult<Option<SessionParticipant>> {
        self.inner
            .set_attendance(session_id, participant_id, status)
            .await
    }

    fn supports_atomic_batches(&self) -> bool {
        self.inner.supports_atomic_batches()
    }

    async fn upsert_assessment(
        &self,
        session_id: Uuid,
        row: &AssessmentWrite,
    ) -> EngineResult<Assessment> {
        self.inner.upsert_assessment(session_id, row).await
    }

    async fn upsert_assessments(
        &self,
        session_id: Uuid,
        rows: &[AssessmentWrite],
    ) -> EngineResult<Vec<Assessment>> {
        self.inner.upsert_assessments(session_id, rows).await
    }

    async fn get_assessment(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<Option<Assessment>> {
        self.inner.get_assessment(session_id, participant_id).await
    }

    async fn list_assessments(&self, session_id: Uuid) -> EngineResult<Vec<Assessment>> {
        let snapshot = self.inner.list_assessments(session_id).await?;
        let delay = self.assessment_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(snapshot)
    }

    async fn insert_certificate(&self, input: &NewCertificate) -> EngineResult<CertificateInsert> {
        self.inner.insert_certificate(input).await
    }

    async fn get_certificate(&self, certificate_id: Uuid) -> EngineResult<Option<Certificate>> {
        self.inner.get_certificate(certificate_id).await
    }

    async fn find_certificate_by_code(&self, code: &str) -> EngineResult<Option<Certificate>> {
        self.inner.find_certificate_by_code(code).await
    }

    async fn list_certificates_for_session(&self, session_id: Uuid) -> EngineResult<Vec<Certificate>> {
        self.inner.list_certificates_for_session(session_id).await
    }

    async fn list_certificates_for_participant(
        &self,
        participant_id: Uuid,
    ) -> EngineResult<Vec<Certificate>> {
        self.inner
            .list_certificates_for_participant(participant_id)
            .await
    }

    async fn list_certificates_for_organization(
        &self,
        organization_id: Uuid,
    ) -> EngineResult<Vec<Certificate>> {
        self.inner
            .list_certificates_for_organization(organization_id)
            .await
    }

    async fn revoke_certificate(
        &self,
        certificate_id: Uuid,
        reason: &str,
        at: OffsetDateTime,
    ) -> EngineResult<Option<Certificate>> {
        self.inner.revoke_certificate(certificate_id, reason, at).await
    }
}
