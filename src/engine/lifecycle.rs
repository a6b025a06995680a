//! Session lifecycle controller.
//!
//! ```text
//! planned ──► active ──► completed
//!    │           │
//!    └──► cancelled ◄┘
//! ```
//!
//! `completed` and `cancelled` are terminal. Transitions never cascade into
//! roster, attendance, or assessment rows.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::models::{NewTrainingSession, SessionStatus, TrainingSession};

use super::audit::{Actor, AuditOperation, AuditRecord, AuditTarget, Audited};
use super::clock::Clock;
use super::error::{EngineError, EngineResult};
use super::store::EntityStore;

/// Attempts made when another caller changes the status between our read and
/// our conditional write.
const MAX_TRANSITION_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionTransition {
    pub session: TrainingSession,
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// Checks an edge against the state machine without touching the store.
pub fn validate_transition(current: SessionStatus, requested: SessionStatus) -> EngineResult<()> {
    if current.can_transition_to(requested) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { current, requested })
    }
}

pub struct LifecycleController {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
}

impl LifecycleController {
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Schedules a session of an active standard. New sessions start `planned`.
    #[instrument(skip(self, input), fields(standard_id = %input.training_standard_id, actor = %actor.user_id))]
    pub async fn create_session(
        &self,
        input: NewTrainingSession,
        actor: &Actor,
    ) -> EngineResult<Audited<TrainingSession>> {
        input.validate()?;
        let standard = self
            .store
            .get_standard(input.training_standard_id)
            .await?
            .ok_or(EngineError::StandardNotFound(input.training_standard_id))?;
        if !standard.is_active {
            return Err(EngineError::StandardInactive(standard.id));
        }

        let session = self.store.insert_session(&input).await?;
        info!(session_id = %session.id, "Training session created");

        let audit = AuditRecord::new(
            AuditOperation::SessionCreated,
            actor,
            AuditTarget::session(session.id),
            self.clock.now(),
        )
        .with_after(&session);
        Ok(Audited::new(session, audit))
    }

    pub async fn get_session(&self, session_id: Uuid) -> EngineResult<TrainingSession> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or(EngineError::SessionNotFound(session_id))
    }

    /// Hard delete, only for sessions nobody was ever enrolled in.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn delete_session(&self, session_id: Uuid, actor: &Actor) -> EngineResult<Audited<()>> {
        let before = self.get_session(session_id).await?;
        if !self.store.delete_session(session_id).await? {
            return Err(EngineError::SessionNotFound(session_id));
        }
        info!(%session_id, "Training session deleted");

        let audit = AuditRecord::new(
            AuditOperation::SessionDeleted,
            actor,
            AuditTarget::session(session_id),
            self.clock.now(),
        )
        .with_before(&before);
        Ok(Audited::new((), audit))
    }

    /// Moves the session to `requested`, validated against the stored status
    /// at the moment of the write.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn transition(
        &self,
        session_id: Uuid,
        requested: SessionStatus,
        actor: &Actor,
    ) -> EngineResult<Audited<SessionTransition>> {
        let mut current = self.get_session(session_id).await?.status;

        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            if let Err(err) = validate_transition(current, requested) {
                warn!(
                    %session_id,
                    %current,
                    %requested,
                    terminal = current.is_terminal(),
                    "Rejected session transition"
                );
                return Err(err);
            }

            if let Some(session) = self
                .store
                .compare_and_set_status(session_id, current, requested)
                .await?
            {
                info!(%session_id, from = %current, to = %requested, "Session transitioned");
                let transition = SessionTransition {
                    session,
                    from: current,
                    to: requested,
                };
                let audit = AuditRecord::new(
                    AuditOperation::SessionTransitioned,
                    actor,
                    AuditTarget::session(session_id),
                    self.clock.now(),
                )
                .with_before(&current)
                .with_after(&requested);
                return Ok(Audited::new(transition, audit));
            }

            debug!(%session_id, attempt, "Session status changed concurrently, re-reading");
            current = self.get_session(session_id).await?.status;
        }

        // Still a legal edge from the latest status: the writes kept losing.
        validate_transition(current, requested)?;
        warn!(%session_id, %current, %requested, "Session transition kept losing to concurrent writers");
        Err(EngineError::TransitionContended {
            session_id,
            attempts: MAX_TRANSITION_ATTEMPTS as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{DeliveryMode, NewTrainingStandard};
    use crate::engine::audit::Role;
    use crate::engine::clock::SystemClock;
    use crate::engine::memory::InMemoryStore;
    use time::macros::date;

    const ALL: [SessionStatus; 4] = [
        SessionStatus::Planned,
        SessionStatus::Active,
        SessionStatus::Completed,
        SessionStatus::Cancelled,
    ];

    async fn setup() -> (LifecycleController, Arc<InMemoryStore>, TrainingSession, Actor) {
        let store = Arc::new(InMemoryStore::new());
        let controller = LifecycleController::new(store.clone(), Arc::new(SystemClock));
        let actor = Actor::new(Uuid::new_v4(), Role::OrgAdmin);

        let standard = store
            .insert_standard(&NewTrainingStandard {
                code: "MCC".to_string(),
                title: "Multi-Crew Cooperation".to_string(),
                validity_months: 12,
            })
            .await
            .unwrap();
        let session = controller
            .create_session(
                NewTrainingSession {
                    training_standard_id: standard.id,
                    start_date: date!(2025 - 05 - 01),
                    end_date: date!(2025 - 05 - 05),
                    location: Some("Hangar 3".to_string()),
                    delivery_mode: DeliveryMode::InPerson,
                },
                &actor,
            )
            .await
            .unwrap()
            .into_value();

        (controller, store, session, actor)
    }

    #[test]
    fn test_only_documented_edges_are_legal() {
        let legal = [
            (SessionStatus::Planned, SessionStatus::Active),
            (SessionStatus::Active, SessionStatus::Completed),
            (SessionStatus::Planned, SessionStatus::Cancelled),
            (SessionStatus::Active, SessionStatus::Cancelled),
        ];

        for from in ALL {
            for to in ALL {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    validate_transition(from, to).is_ok(),
                    expected,
                    "{from} -> {to}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_new_session_is_planned() {
        let (_, _, session, _) = setup().await;
        assert_eq!(session.status, SessionStatus::Planned);
    }

    #[tokio::test]
    async fn test_transition_reports_before_and_after() {
        let (controller, _, session, actor) = setup().await;

        let result = controller
            .transition(session.id, SessionStatus::Active, &actor)
            .await
            .unwrap();

        assert_eq!(result.value.from, SessionStatus::Planned);
        assert_eq!(result.value.to, SessionStatus::Active);
        assert_eq!(result.value.session.status, SessionStatus::Active);
        assert_eq!(result.audit.before, Some(serde_json::json!("planned")));
        assert_eq!(result.audit.after, Some(serde_json::json!("active")));
    }

    #[tokio::test]
    async fn test_invalid_transition_leaves_status_unchanged() {
        let (controller, _, session, actor) = setup().await;

        let err = controller
            .transition(session.id, SessionStatus::Completed, &actor)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            EngineError::InvalidTransition {
                current: SessionStatus::Planned,
                requested: SessionStatus::Completed,
            }
        );
        assert_eq!(
            controller.get_session(session.id).await.unwrap().status,
            SessionStatus::Planned
        );
    }

    #[tokio::test]
    async fn test_terminal_states_have_no_exit() {
        let (controller, _, session, actor) = setup().await;
        controller
            .transition(session.id, SessionStatus::Cancelled, &actor)
            .await
            .unwrap();

        for to in ALL {
            let result = controller.transition(session.id, to, &actor).await;
            assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
        }
    }

    #[tokio::test]
    async fn test_delete_session_refused_with_participants() {
        let (controller, store, session, actor) = setup().await;
        let participant = Uuid::new_v4();
        store.add_user(participant, None).await;
        store.insert_participant(session.id, participant).await.unwrap();

        let result = controller.delete_session(session.id, &actor).await;
        assert_eq!(result.unwrap_err(), EngineError::SessionHasParticipants(session.id));
    }

    #[tokio::test]
    async fn test_delete_empty_session() {
        let (controller, _, session, actor) = setup().await;
        controller.delete_session(session.id, &actor).await.unwrap();

        let result = controller.get_session(session.id).await;
        assert_eq!(result.unwrap_err(), EngineError::SessionNotFound(session.id));
    }

    #[tokio::test]
    async fn test_create_session_requires_active_standard() {
        let store = Arc::new(InMemoryStore::new());
        let controller = LifecycleController::new(store.clone(), Arc::new(SystemClock));
        let actor = Actor::new(Uuid::new_v4(), Role::OrgAdmin);
        let standard = store
            .insert_standard(&NewTrainingStandard {
                code: "OLD".to_string(),
                title: "Retired course".to_string(),
                validity_months: 12,
            })
            .await
            .unwrap();
        store.set_standard_active(standard.id, false).await.unwrap();

        let result = controller
            .create_session(
                NewTrainingSession {
                    training_standard_id: standard.id,
                    start_date: date!(2025 - 05 - 01),
                    end_date: date!(2025 - 05 - 01),
                    location: None,
                    delivery_mode: DeliveryMode::Online,
                },
                &actor,
            )
            .await;
        assert_eq!(result.unwrap_err(), EngineError::StandardInactive(standard.id));
    }

    #[tokio::test]
    async fn test_create_session_rejects_inverted_dates() {
        let (controller, _, session, actor) = setup().await;

        let result = controller
            .create_session(
                NewTrainingSession {
                    training_standard_id: session.training_standard_id,
                    start_date: date!(2025 - 05 - 05),
                    end_date: date!(2025 - 05 - 01),
                    location: None,
                    delivery_mode: DeliveryMode::Hybrid,
                },
                &actor,
            )
            .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }
}
