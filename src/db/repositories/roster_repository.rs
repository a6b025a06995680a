use crate::db::models::{AttendanceStatus, SessionInstructor, SessionParticipant};

use sqlx::{Error, PgExecutor};
use uuid::Uuid;

const PARTICIPANT_COLUMNS: &str = "session_id, participant_id, attendance_status, enrolled_at, updated_at";

/// Row lock taken on an enrollment inside a transaction. Issuance shares
/// it; removal and failing regrades take it exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    Share,
    Update,
}

impl RowLock {
    fn clause(self) -> &'static str {
        match self {
            RowLock::Share => "FOR SHARE",
            RowLock::Update => "FOR UPDATE",
        }
    }
}

pub struct RosterRepository;

impl RosterRepository {
    // Instructors

    pub async fn add_instructor<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
        instructor_id: Uuid,
    ) -> Result<SessionInstructor, Error> {
        sqlx::query_as::<_, SessionInstructor>(
            r#"
            INSERT INTO session_instructors (session_id, instructor_id)
            VALUES ($1, $2)
            RETURNING session_id, instructor_id, assigned_at
            "#,
        )
        .bind(session_id)
        .bind(instructor_id)
        .fetch_one(executor)
        .await
    }

    pub async fn remove_instructor<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
        instructor_id: Uuid,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            "DELETE FROM session_instructors WHERE session_id = $1 AND instructor_id = $2",
        )
        .bind(session_id)
        .bind(instructor_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_instructors<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
    ) -> Result<Vec<SessionInstructor>, Error> {
        sqlx::query_as::<_, SessionInstructor>(
            r#"
            SELECT session_id, instructor_id, assigned_at
            FROM session_instructors
            WHERE session_id = $1
            ORDER BY instructor_id
            "#,
        )
        .bind(session_id)
        .fetch_all(executor)
        .await
    }

    // Participants

    pub async fn add_participant<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> Result<SessionParticipant, Error> {
        sqlx::query_as::<_, SessionParticipant>(&format!(
            r#"
            INSERT INTO session_participants (session_id, participant_id, attendance_status)
            VALUES ($1, $2, 'enrolled')
            RETURNING {PARTICIPANT_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(participant_id)
        .fetch_one(executor)
        .await
    }

    pub async fn get_participant<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<SessionParticipant>, Error> {
        sqlx::query_as::<_, SessionParticipant>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM session_participants \
             WHERE session_id = $1 AND participant_id = $2"
        ))
        .bind(session_id)
        .bind(participant_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn list_participants<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
    ) -> Result<Vec<SessionParticipant>, Error> {
        sqlx::query_as::<_, SessionParticipant>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM session_participants \
             WHERE session_id = $1 ORDER BY participant_id"
        ))
        .bind(session_id)
        .fetch_all(executor)
        .await
    }

    /// Locks the enrollment row until the transaction ends. `false` when the
    /// participant is not enrolled.
    pub async fn lock_participant<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
        participant_id: Uuid,
        lock: RowLock,
    ) -> Result<bool, Error> {
        let locked = sqlx::query_scalar::<_, i32>(&format!(
            "SELECT 1 FROM session_participants \
             WHERE session_id = $1 AND participant_id = $2 {}",
            lock.clause()
        ))
        .bind(session_id)
        .bind(participant_id)
        .fetch_optional(executor)
        .await?;

        Ok(locked.is_some())
    }

    /// The assessment row cascades with the enrollment.
    pub async fn remove_participant<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            "DELETE FROM session_participants WHERE session_id = $1 AND participant_id = $2",
        )
        .bind(session_id)
        .bind(participant_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_attendance<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
        participant_id: Uuid,
        status: AttendanceStatus,
    ) -> Result<Option<SessionParticipant>, Error> {
        sqlx::query_as::<_, SessionParticipant>(&format!(
            r#"
            UPDATE session_participants
            SET attendance_status = $3, updated_at = NOW()
            WHERE session_id = $1 AND participant_id = $2
            RETURNING {PARTICIPANT_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(participant_id)
        .bind(status)
        .fetch_optional(executor)
        .await
    }
}
