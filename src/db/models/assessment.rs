use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::OffsetDateTime;
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "assessment_result", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssessmentResult {
    Pass,
    Fail,
    #[default]
    Pending,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub session_id: Uuid,
    pub participant_id: Uuid,
    pub score: Option<f64>,
    pub result: AssessmentResult,
    pub remarks: String,
    pub graded_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Caller-supplied grading for one participant. Score bounds are checked by
/// the recorder before this reaches the store.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AssessmentInput {
    pub participant_id: Uuid,
    pub score: Option<f64>,
    pub result: Option<AssessmentResult>,
    #[validate(length(max = 4000))]
    pub remarks: Option<String>,
}

/// A validated row ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentWrite {
    pub participant_id: Uuid,
    pub score: Option<f64>,
    pub result: AssessmentResult,
    pub remarks: String,
    pub graded_by: Uuid,
}
