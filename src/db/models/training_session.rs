use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::{Date, OffsetDateTime};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "session_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Planned,
    Active,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Planned => "planned",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// `completed` and `cancelled` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Planned, SessionStatus::Active)
                | (SessionStatus::Active, SessionStatus::Completed)
                | (SessionStatus::Planned, SessionStatus::Cancelled)
                | (SessionStatus::Active, SessionStatus::Cancelled)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planned" => Ok(SessionStatus::Planned),
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "delivery_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    InPerson,
    Online,
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct TrainingSession {
    pub id: Uuid,
    pub training_standard_id: Uuid,
    pub start_date: Date,
    pub end_date: Date,
    pub location: Option<String>,
    pub delivery_mode: DeliveryMode,
    pub status: SessionStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_session_dates"))]
pub struct NewTrainingSession {
    pub training_standard_id: Uuid,
    pub start_date: Date,
    pub end_date: Date,
    #[validate(length(min = 1, max = 255))]
    pub location: Option<String>,
    pub delivery_mode: DeliveryMode,
}

fn validate_session_dates(session: &NewTrainingSession) -> Result<(), ValidationError> {
    if session.end_date < session.start_date {
        let mut err = ValidationError::new("end_before_start");
        err.message = Some("end_date must not precede start_date".into());
        return Err(err);
    }
    Ok(())
}
