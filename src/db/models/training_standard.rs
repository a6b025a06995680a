use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::OffsetDateTime;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct TrainingStandard {
    pub id: Uuid,
    pub code: String,
    pub title: String,
    pub validity_months: i32,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewTrainingStandard {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(range(min = 1, max = 240))]
    pub validity_months: i32,
}

/// Edits are only accepted while no session references the standard.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateTrainingStandard {
    #[validate(length(min = 1))]
    pub title: Option<String>,
    #[validate(range(min = 1, max = 240))]
    pub validity_months: Option<i32>,
}
