//! Acting-user extraction and the role capability table.
//!
//! Identity is established upstream; this layer trusts the forwarded headers
//! and decides once, before any engine call, whether the role may perform
//! the requested operation.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::engine::{Actor, Role};
use crate::error::AppError;

pub const ACTING_USER_HEADER: &str = "x-acting-user-id";
pub const ACTING_ROLE_HEADER: &str = "x-acting-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ManageStandards,
    ViewStandards,
    ManageSessions,
    TransitionSession,
    ViewSessions,
    ManageInstructors,
    ManageParticipants,
    ViewRoster,
    RecordAttendance,
    RecordAssessments,
    ViewAssessments,
    IssueCertificates,
    RevokeCertificates,
    ViewCertificates,
    ViewCompliance,
}

pub struct Capability;

impl Capability {
    pub fn allows(role: Role, operation: Operation) -> bool {
        use Operation::*;

        match role {
            Role::PlatformAdmin => true,
            Role::OrgAdmin => !matches!(operation, ManageStandards),
            Role::Instructor => matches!(
                operation,
                ViewStandards
                    | ViewSessions
                    | TransitionSession
                    | ViewRoster
                    | RecordAttendance
                    | RecordAssessments
                    | ViewAssessments
                    | IssueCertificates
                    | ViewCertificates
            ),
            Role::Trainee => matches!(operation, ViewStandards | ViewSessions | ViewCertificates),
        }
    }
}

/// The caller identity forwarded by the identity layer.
#[derive(Debug, Clone, Copy)]
pub struct ActingUser(pub Actor);

impl ActingUser {
    /// Returns the actor if its role may perform `operation`.
    pub fn require(&self, operation: Operation) -> Result<&Actor, AppError> {
        if Capability::allows(self.0.role, operation) {
            Ok(&self.0)
        } else {
            tracing::debug!(user_id = %self.0.user_id, role = %self.0.role, ?operation, "Capability check failed");
            Err(AppError::Authorization(format!(
                "role {} may not perform {:?}",
                self.0.role, operation
            )))
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Authentication(format!("missing {} header", name)))
}

impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, ACTING_USER_HEADER)?
            .parse::<Uuid>()
            .map_err(|_| AppError::Authentication(format!("{} is not a valid id", ACTING_USER_HEADER)))?;
        let role = header(parts, ACTING_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(AppError::Authentication)?;

        Ok(ActingUser(Actor::new(user_id, role)))
    }
}
