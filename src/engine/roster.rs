use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::db::models::{SessionInstructor, SessionParticipant, SessionStatus, TrainingSession};

use super::audit::{Actor, AuditOperation, AuditRecord, AuditTarget, Audited};
use super::clock::Clock;
use super::error::{EngineError, EngineResult};
use super::store::EntityStore;

/// Candidates not yet on the roster, in pool order.
///
/// Advisory only: populates pickers. Concurrent assignment of the same person
/// is still caught by the store.
pub fn list_available<T, F>(candidate_pool: Vec<T>, already_assigned: &[Uuid], id_of: F) -> Vec<T>
where
    F: Fn(&T) -> Uuid,
{
    let assigned: HashSet<Uuid> = already_assigned.iter().copied().collect();
    candidate_pool
        .into_iter()
        .filter(|candidate| !assigned.contains(&id_of(candidate)))
        .collect()
}

/// Instructor assignments and participant enrollments of a session.
pub struct RosterManager {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
}

impl RosterManager {
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn open_session(&self, session_id: Uuid) -> EngineResult<TrainingSession> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(EngineError::SessionNotFound(session_id))?;
        if session.status == SessionStatus::Cancelled {
            return Err(EngineError::SessionClosed {
                session_id,
                status: session.status,
            });
        }
        Ok(session)
    }

    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn assign_instructor(
        &self,
        session_id: Uuid,
        instructor_id: Uuid,
        actor: &Actor,
    ) -> EngineResult<Audited<SessionInstructor>> {
        self.open_session(session_id).await?;

        let assignment = self
            .store
            .insert_instructor(session_id, instructor_id)
            .await
            .inspect_err(|err| {
                if err.is_duplicate() {
                    debug!(%session_id, %instructor_id, "Instructor already assigned");
                }
            })?;
        info!(%session_id, %instructor_id, "Instructor assigned");

        let audit = AuditRecord::new(
            AuditOperation::InstructorAssigned,
            actor,
            AuditTarget::session_user(session_id, instructor_id),
            self.clock.now(),
        )
        .with_after(&assignment);
        Ok(Audited::new(assignment, audit))
    }

    /// Idempotent: removing an absent instructor succeeds and reports `false`.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn remove_instructor(
        &self,
        session_id: Uuid,
        instructor_id: Uuid,
        actor: &Actor,
    ) -> EngineResult<Audited<bool>> {
        let removed = self.store.delete_instructor(session_id, instructor_id).await?;
        if removed {
            info!(%session_id, %instructor_id, "Instructor removed");
        }

        let audit = AuditRecord::new(
            AuditOperation::InstructorRemoved,
            actor,
            AuditTarget::session_user(session_id, instructor_id),
            self.clock.now(),
        )
        .with_after(&removed);
        Ok(Audited::new(removed, audit))
    }

    pub async fn list_instructors(&self, session_id: Uuid) -> EngineResult<Vec<SessionInstructor>> {
        self.store.list_instructors(session_id).await
    }

    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn enroll_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        actor: &Actor,
    ) -> EngineResult<Audited<SessionParticipant>> {
        self.open_session(session_id).await?;

        let enrollment = self
            .store
            .insert_participant(session_id, participant_id)
            .await
            .inspect_err(|err| {
                if err.is_duplicate() {
                    debug!(%session_id, %participant_id, "Participant already enrolled");
                }
            })?;
        info!(%session_id, %participant_id, "Participant enrolled");

        let audit = AuditRecord::new(
            AuditOperation::ParticipantEnrolled,
            actor,
            AuditTarget::session_user(session_id, participant_id),
            self.clock.now(),
        )
        .with_after(&enrollment);
        Ok(Audited::new(enrollment, audit))
    }

    /// Explicit admin removal. The participant's assessment goes with the
    /// enrollment; a live certificate blocks removal until revoked.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn remove_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        actor: &Actor,
    ) -> EngineResult<Audited<SessionParticipant>> {
        let enrollment = self
            .store
            .get_participant(session_id, participant_id)
            .await?
            .ok_or(EngineError::ReferentialViolation {
                session_id,
                participant_id,
            })?;

        let assessment = self.store.get_assessment(session_id, participant_id).await?;
        // The store refuses the delete while a live certificate exists.
        if !self.store.delete_participant(session_id, participant_id).await? {
            return Err(EngineError::ReferentialViolation {
                session_id,
                participant_id,
            });
        }
        info!(%session_id, %participant_id, "Participant removed");

        let audit = AuditRecord::new(
            AuditOperation::ParticipantRemoved,
            actor,
            AuditTarget::session_user(session_id, participant_id),
            self.clock.now(),
        )
        .with_before(&serde_json::json!({
            "enrollment": enrollment,
            "assessment": assessment,
        }));
        Ok(Audited::new(enrollment, audit))
    }

    pub async fn list_participants(&self, session_id: Uuid) -> EngineResult<Vec<SessionParticipant>> {
        self.store.list_participants(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        AssessmentResult, AssessmentWrite, DeliveryMode, NewTrainingSession, NewTrainingStandard,
    };
    use crate::engine::audit::Role;
    use crate::engine::clock::SystemClock;
    use crate::engine::memory::InMemoryStore;
    use time::macros::date;

    struct Fixture {
        roster: RosterManager,
        store: Arc<InMemoryStore>,
        session_id: Uuid,
        actor: Actor,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let standard = store
            .insert_standard(&NewTrainingStandard {
                code: "DG".to_string(),
                title: "Dangerous Goods".to_string(),
                validity_months: 24,
            })
            .await
            .unwrap();
        let session = store
            .insert_session(&NewTrainingSession {
                training_standard_id: standard.id,
                start_date: date!(2025 - 06 - 02),
                end_date: date!(2025 - 06 - 02),
                location: None,
                delivery_mode: DeliveryMode::Online,
            })
            .await
            .unwrap();

        Fixture {
            roster: RosterManager::new(store.clone(), Arc::new(SystemClock)),
            store,
            session_id: session.id,
            actor: Actor::new(Uuid::new_v4(), Role::OrgAdmin),
        }
    }

    async fn user(store: &InMemoryStore) -> Uuid {
        let id = Uuid::new_v4();
        store.add_user(id, None).await;
        id
    }

    #[test]
    fn test_list_available_filters_assigned() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let available = list_available(vec![a, b, c], &[b], |id| *id);
        assert_eq!(available, vec![a, c]);
    }

    #[tokio::test]
    async fn test_duplicate_assignment_rejected() {
        let f = fixture().await;
        let instructor = user(&f.store).await;

        f.roster
            .assign_instructor(f.session_id, instructor, &f.actor)
            .await
            .unwrap();
        let err = f
            .roster
            .assign_instructor(f.session_id, instructor, &f.actor)
            .await
            .unwrap_err();

        assert!(err.is_duplicate());
        assert_eq!(f.roster.list_instructors(f.session_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_instructor_is_idempotent() {
        let f = fixture().await;
        let instructor = user(&f.store).await;
        f.roster
            .assign_instructor(f.session_id, instructor, &f.actor)
            .await
            .unwrap();

        let first = f
            .roster
            .remove_instructor(f.session_id, instructor, &f.actor)
            .await
            .unwrap();
        let second = f
            .roster
            .remove_instructor(f.session_id, instructor, &f.actor)
            .await
            .unwrap();

        assert!(first.value);
        assert!(!second.value);
    }

    #[tokio::test]
    async fn test_enrollment_starts_enrolled() {
        let f = fixture().await;
        let participant = user(&f.store).await;

        let enrollment = f
            .roster
            .enroll_participant(f.session_id, participant, &f.actor)
            .await
            .unwrap();

        assert_eq!(
            enrollment.value.attendance_status,
            crate::db::models::AttendanceStatus::Enrolled
        );
        assert_eq!(enrollment.audit.operation, AuditOperation::ParticipantEnrolled);
    }

    #[tokio::test]
    async fn test_second_enrollment_has_no_side_effect() {
        let f = fixture().await;
        let participant = user(&f.store).await;
        f.roster
            .enroll_participant(f.session_id, participant, &f.actor)
            .await
            .unwrap();

        let err = f
            .roster
            .enroll_participant(f.session_id, participant, &f.actor)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            EngineError::DuplicateEnrollment {
                session_id: f.session_id,
                participant_id: participant,
            }
        );
        assert_eq!(f.store.participant_count(f.session_id).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_user_cannot_enroll() {
        let f = fixture().await;
        let stranger = Uuid::new_v4();

        let err = f
            .roster
            .enroll_participant(f.session_id, stranger, &f.actor)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::UserNotFound(stranger));
    }

    #[tokio::test]
    async fn test_cancelled_session_closes_roster() {
        let f = fixture().await;
        let participant = user(&f.store).await;
        f.store
            .compare_and_set_status(f.session_id, SessionStatus::Planned, SessionStatus::Cancelled)
            .await
            .unwrap();

        let err = f
            .roster
            .enroll_participant(f.session_id, participant, &f.actor)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionClosed { .. }));
    }

    #[tokio::test]
    async fn test_remove_participant_drops_assessment() {
        let f = fixture().await;
        let participant = user(&f.store).await;
        f.roster
            .enroll_participant(f.session_id, participant, &f.actor)
            .await
            .unwrap();
        f.store
            .upsert_assessment(
                f.session_id,
                &AssessmentWrite {
                    participant_id: participant,
                    score: Some(40.0),
                    result: AssessmentResult::Fail,
                    remarks: String::new(),
                    graded_by: f.actor.user_id,
                },
            )
            .await
            .unwrap();

        let removed = f
            .roster
            .remove_participant(f.session_id, participant, &f.actor)
            .await
            .unwrap();

        assert_eq!(removed.value.participant_id, participant);
        assert_eq!(f.store.participant_count(f.session_id).await, 0);
        assert_eq!(f.store.assessment_count(f.session_id).await, 0);
    }

    #[tokio::test]
    async fn test_remove_unknown_participant_is_referential_violation() {
        let f = fixture().await;
        let participant = Uuid::new_v4();

        let err = f
            .roster
            .remove_participant(f.session_id, participant, &f.actor)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ReferentialViolation { .. }));
    }
}
