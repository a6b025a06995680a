use crate::db::models::{NewTrainingSession, SessionStatus, TrainingSession};

use sqlx::{Error, PgExecutor};
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, training_standard_id, start_date, end_date, location, \
     delivery_mode, status, created_at, updated_at";

pub struct SessionRepository;

impl SessionRepository {
    pub async fn create_session<'e>(
        executor: impl PgExecutor<'e>,
        input: &NewTrainingSession,
    ) -> Result<TrainingSession, Error> {
        sqlx::query_as::<_, TrainingSession>(&format!(
            r#"
            INSERT INTO training_sessions (training_standard_id, start_date, end_date, location, delivery_mode, status)
            VALUES ($1, $2, $3, $4, $5, 'planned')
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(input.training_standard_id)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.location.as_deref())
        .bind(input.delivery_mode)
        .fetch_one(executor)
        .await
    }

    pub async fn get_session_by_id<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
    ) -> Result<Option<TrainingSession>, Error> {
        sqlx::query_as::<_, TrainingSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM training_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(executor)
        .await
    }

    /// Enrollments restrict the delete; instructor rows cascade.
    pub async fn delete_session<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
    ) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM training_sessions WHERE id = $1")
            .bind(session_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Conditional status write. `None` means the stored status was no
    /// longer `expected` (or the session is gone).
    pub async fn compare_and_set_status<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> Result<Option<TrainingSession>, Error> {
        sqlx::query_as::<_, TrainingSession>(&format!(
            r#"
            UPDATE training_sessions
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(expected)
        .bind(next)
        .fetch_optional(executor)
        .await
    }
}
