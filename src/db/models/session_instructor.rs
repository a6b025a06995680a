use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct SessionInstructor {
    pub session_id: Uuid,
    pub instructor_id: Uuid,
    pub assigned_at: OffsetDateTime,
}
