use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "attendance_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Enrolled,
    Attended,
    Absent,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct SessionParticipant {
    pub session_id: Uuid,
    pub participant_id: Uuid,
    pub attendance_status: AttendanceStatus,
    pub enrolled_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
