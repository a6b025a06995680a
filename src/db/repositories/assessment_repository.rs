use crate::db::models::{Assessment, AssessmentWrite};

use sqlx::{Error, PgExecutor};
use uuid::Uuid;

const ASSESSMENT_COLUMNS: &str = "id, session_id, participant_id, score, result, remarks, \
     graded_by, created_at, updated_at";

pub struct AssessmentRepository;

impl AssessmentRepository {
    /// Insert or overwrite the single assessment row for the pair. The
    /// enrollment foreign key rejects non-enrolled participants.
    pub async fn upsert_assessment<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
        row: &AssessmentWrite,
    ) -> Result<Assessment, Error> {
        sqlx::query_as::<_, Assessment>(&format!(
            r#"
            INSERT INTO assessments (session_id, participant_id, score, result, remarks, graded_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT ON CONSTRAINT assessments_session_participant_key DO UPDATE
            SET score = EXCLUDED.score,
                result = EXCLUDED.result,
                remarks = EXCLUDED.remarks,
                graded_by = EXCLUDED.graded_by,
                updated_at = NOW()
            RETURNING {ASSESSMENT_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(row.participant_id)
        .bind(row.score)
        .bind(row.result)
        .bind(&row.remarks)
        .bind(row.graded_by)
        .fetch_one(executor)
        .await
    }

    pub async fn get_assessment<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<Assessment>, Error> {
        sqlx::query_as::<_, Assessment>(&format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessments \
             WHERE session_id = $1 AND participant_id = $2"
        ))
        .bind(session_id)
        .bind(participant_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn list_assessments<'e>(
        executor: impl PgExecutor<'e>,
        session_id: Uuid,
    ) -> Result<Vec<Assessment>, Error> {
        sqlx::query_as::<_, Assessment>(&format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessments \
             WHERE session_id = $1 ORDER BY participant_id"
        ))
        .bind(session_id)
        .fetch_all(executor)
        .await
    }
}
