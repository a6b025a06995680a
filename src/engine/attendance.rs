use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::models::{AttendanceStatus, SessionParticipant};

use super::audit::{Actor, AuditOperation, AuditRecord, AuditTarget, Audited};
use super::clock::Clock;
use super::error::{EngineError, EngineResult};
use super::store::EntityStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceSummary {
    pub enrolled: usize,
    pub attended: usize,
    pub absent: usize,
}

impl AttendanceSummary {
    pub fn total(&self) -> usize {
        self.enrolled + self.attended + self.absent
    }

    pub fn from_enrollments<'a>(enrollments: impl IntoIterator<Item = &'a SessionParticipant>) -> Self {
        enrollments
            .into_iter()
            .fold(Self::default(), |mut summary, enrollment| {
                match enrollment.attendance_status {
                    AttendanceStatus::Enrolled => summary.enrolled += 1,
                    AttendanceStatus::Attended => summary.attended += 1,
                    AttendanceStatus::Absent => summary.absent += 1,
                }
                summary
            })
    }
}

pub struct AttendanceTracker {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
}

impl AttendanceTracker {
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Last write wins. Legal in every session status so sessions can be
    /// marked up after the fact.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn set_attendance(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        status: AttendanceStatus,
        actor: &Actor,
    ) -> EngineResult<Audited<SessionParticipant>> {
        let before = self
            .store
            .get_participant(session_id, participant_id)
            .await?
            .map(|e| e.attendance_status);

        let updated = self
            .store
            .set_attendance(session_id, participant_id, status)
            .await?
            .ok_or(EngineError::ReferentialViolation {
                session_id,
                participant_id,
            })?;
        info!(%session_id, %participant_id, ?status, "Attendance recorded");

        let audit = AuditRecord::new(
            AuditOperation::AttendanceSet,
            actor,
            AuditTarget::session_user(session_id, participant_id),
            self.clock.now(),
        )
        .with_before(&before)
        .with_after(&status);
        Ok(Audited::new(updated, audit))
    }

    pub async fn summarize(&self, session_id: Uuid) -> EngineResult<AttendanceSummary> {
        let enrollments = self.store.list_participants(session_id).await?;
        Ok(AttendanceSummary::from_enrollments(&enrollments))
    }
}
