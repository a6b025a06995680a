use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use time::{Date, OffsetDateTime};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub certificate_code: String,
    pub participant_id: Uuid,
    pub session_id: Uuid,
    pub training_standard_id: Uuid,
    pub issue_date: Date,
    pub expiry_date: Date,
    pub revoked_at: Option<OffsetDateTime>,
    pub revocation_reason: Option<String>,
    pub created_at: OffsetDateTime,
}

impl Certificate {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Read-time status. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Valid,
    Expiring,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCertificate {
    pub certificate_code: String,
    pub participant_id: Uuid,
    pub session_id: Uuid,
    pub training_standard_id: Uuid,
    pub issue_date: Date,
    pub expiry_date: Date,
}
