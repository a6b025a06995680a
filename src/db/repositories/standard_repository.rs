use crate::db::models::{NewTrainingStandard, TrainingStandard, UpdateTrainingStandard};

use sqlx::{Error, PgExecutor};
use uuid::Uuid;

const STANDARD_COLUMNS: &str =
    "id, code, title, validity_months, is_active, created_at, updated_at";

pub struct StandardRepository;

impl StandardRepository {
    pub async fn create_standard<'e>(
        executor: impl PgExecutor<'e>,
        input: &NewTrainingStandard,
    ) -> Result<TrainingStandard, Error> {
        sqlx::query_as::<_, TrainingStandard>(&format!(
            r#"
            INSERT INTO training_standards (code, title, validity_months)
            VALUES ($1, $2, $3)
            RETURNING {STANDARD_COLUMNS}
            "#
        ))
        .bind(&input.code)
        .bind(&input.title)
        .bind(input.validity_months)
        .fetch_one(executor)
        .await
    }

    pub async fn get_standard_by_id<'e>(
        executor: impl PgExecutor<'e>,
        standard_id: Uuid,
    ) -> Result<Option<TrainingStandard>, Error> {
        sqlx::query_as::<_, TrainingStandard>(&format!(
            "SELECT {STANDARD_COLUMNS} FROM training_standards WHERE id = $1"
        ))
        .bind(standard_id)
        .fetch_optional(executor)
        .await
    }

    /// Applies the edit only while no session references the standard.
    /// Returns `None` when the standard is missing or in use.
    pub async fn update_unreferenced_standard<'e>(
        executor: impl PgExecutor<'e>,
        standard_id: Uuid,
        input: &UpdateTrainingStandard,
    ) -> Result<Option<TrainingStandard>, Error> {
        sqlx::query_as::<_, TrainingStandard>(&format!(
            r#"
            UPDATE training_standards
            SET title = COALESCE($2, title),
                validity_months = COALESCE($3, validity_months),
                updated_at = NOW()
            WHERE id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM training_sessions WHERE training_standard_id = $1
              )
            RETURNING {STANDARD_COLUMNS}
            "#
        ))
        .bind(standard_id)
        .bind(input.title.as_deref())
        .bind(input.validity_months)
        .fetch_optional(executor)
        .await
    }

    pub async fn set_active<'e>(
        executor: impl PgExecutor<'e>,
        standard_id: Uuid,
        is_active: bool,
    ) -> Result<Option<TrainingStandard>, Error> {
        sqlx::query_as::<_, TrainingStandard>(&format!(
            r#"
            UPDATE training_standards
            SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {STANDARD_COLUMNS}
            "#
        ))
        .bind(standard_id)
        .bind(is_active)
        .fetch_optional(executor)
        .await
    }

    pub async fn count_sessions<'e>(
        executor: impl PgExecutor<'e>,
        standard_id: Uuid,
    ) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM training_sessions WHERE training_standard_id = $1",
        )
        .bind(standard_id)
        .fetch_one(executor)
        .await
    }
}
