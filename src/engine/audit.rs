//! Structured detail returned with every mutation so the caller can forward
//! it to the audit sink and notification service. The engine writes no audit
//! rows itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Trainee,
    Instructor,
    OrgAdmin,
    PlatformAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Trainee => "trainee",
            Role::Instructor => "instructor",
            Role::OrgAdmin => "org_admin",
            Role::PlatformAdmin => "platform_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trainee" | "participant" => Ok(Role::Trainee),
            "instructor" => Ok(Role::Instructor),
            "org_admin" | "organization_admin" => Ok(Role::OrgAdmin),
            "platform_admin" | "admin" => Ok(Role::PlatformAdmin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// The acting user, as asserted by the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    StandardCreated,
    StandardUpdated,
    StandardActivationChanged,
    SessionCreated,
    SessionDeleted,
    SessionTransitioned,
    InstructorAssigned,
    InstructorRemoved,
    ParticipantEnrolled,
    ParticipantRemoved,
    AttendanceSet,
    AssessmentRecorded,
    AssessmentsBulkRecorded,
    CertificatesIssued,
    CertificateRevoked,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<Uuid>,
}

impl AuditTarget {
    pub fn standard(standard_id: Uuid) -> Self {
        Self {
            standard_id: Some(standard_id),
            ..Default::default()
        }
    }

    pub fn session(session_id: Uuid) -> Self {
        Self {
            session_id: Some(session_id),
            ..Default::default()
        }
    }

    pub fn session_user(session_id: Uuid, user_id: Uuid) -> Self {
        Self {
            session_id: Some(session_id),
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn certificate(certificate_id: Uuid) -> Self {
        Self {
            certificate_id: Some(certificate_id),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub operation: AuditOperation,
    pub actor: Actor,
    pub target: AuditTarget,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

impl AuditRecord {
    pub fn new(operation: AuditOperation, actor: &Actor, target: AuditTarget, at: OffsetDateTime) -> Self {
        Self {
            operation,
            actor: *actor,
            target,
            before: None,
            after: None,
            at,
        }
    }

    pub fn with_before<T: Serialize>(mut self, before: &T) -> Self {
        self.before = serde_json::to_value(before).ok();
        self
    }

    pub fn with_after<T: Serialize>(mut self, after: &T) -> Self {
        self.after = serde_json::to_value(after).ok();
        self
    }
}

/// A mutation result paired with its audit detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Audited<T> {
    pub value: T,
    pub audit: AuditRecord,
}

impl<T> Audited<T> {
    pub fn new(value: T, audit: AuditRecord) -> Self {
        Self { value, audit }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
