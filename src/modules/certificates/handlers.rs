use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::engine::{CertificateView, ComplianceReport, Role};
use crate::error::{AppError, AppResult};
use crate::middleware::{ActingUser, Operation};
use crate::modules::{forward_audit, AuditedResponse};

#[derive(Debug, Deserialize, Validate)]
pub struct RevokeRequest {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ComplianceResponse {
    #[serde(flatten)]
    pub report: ComplianceReport,
    pub compliance_rate: Option<f64>,
}

pub async fn get_certificate(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(certificate_id): Path<Uuid>,
) -> AppResult<Json<CertificateView>> {
    let actor = acting.require(Operation::ViewCertificates)?;
    let engine = &state.engine;
    let view = state
        .retry
        .run("get_certificate", move || engine.certificates.get_certificate(certificate_id))
        .await?;

    ensure_own_record(actor.role, actor.user_id, view.certificate.participant_id)?;
    Ok(Json(view))
}

/// Public verification by printed code.
pub async fn verify_certificate(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(code): Path<String>,
) -> AppResult<Json<CertificateView>> {
    acting.require(Operation::ViewCertificates)?;
    let engine = &state.engine;
    let code = code.as_str();
    let view = state
        .retry
        .run("verify_certificate", move || engine.certificates.find_by_code(code))
        .await?;
    Ok(Json(view))
}

pub async fn revoke_certificate(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(certificate_id): Path<Uuid>,
    Json(body): Json<RevokeRequest>,
) -> AppResult<Json<AuditedResponse<CertificateView>>> {
    let actor = acting.require(Operation::RevokeCertificates)?;
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let revoked = state
        .engine
        .certificates
        .revoke_certificate(certificate_id, &body.reason, actor)
        .await?;
    Ok(forward_audit(revoked))
}

pub async fn list_user_certificates(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<CertificateView>>> {
    let actor = acting.require(Operation::ViewCertificates)?;
    ensure_own_record(actor.role, actor.user_id, user_id)?;

    let engine = &state.engine;
    let certificates = state
        .retry
        .run("list_user_certificates", move || {
            engine.certificates.list_for_participant(user_id)
        })
        .await?;
    Ok(Json(certificates))
}

pub async fn organization_compliance(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(organization_id): Path<Uuid>,
) -> AppResult<Json<ComplianceResponse>> {
    acting.require(Operation::ViewCompliance)?;
    let engine = &state.engine;
    let report = state
        .retry
        .run("organization_compliance", move || {
            engine.compliance.aggregate_for_organization(organization_id)
        })
        .await?;

    let compliance_rate = report.compliance_rate();
    Ok(Json(ComplianceResponse {
        report,
        compliance_rate,
    }))
}

/// Trainees only see their own certificates.
fn ensure_own_record(role: Role, acting_user: Uuid, owner: Uuid) -> AppResult<()> {
    if role == Role::Trainee && acting_user != owner {
        return Err(AppError::Authorization(
            "trainees may only view their own certificates".to_string(),
        ));
    }
    Ok(())
}

/// Drops certificates a trainee does not own; other roles see everything.
pub(crate) fn retain_visible(
    role: Role,
    acting_user: Uuid,
    mut certificates: Vec<CertificateView>,
) -> Vec<CertificateView> {
    if role == Role::Trainee {
        certificates.retain(|view| view.certificate.participant_id == acting_user);
    }
    certificates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Certificate, CertificateStatus};

    #[test]
    fn test_trainee_restricted_to_own_certificates() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(ensure_own_record(Role::Trainee, me, me).is_ok());
        assert!(matches!(
            ensure_own_record(Role::Trainee, me, other),
            Err(AppError::Authorization(_))
        ));
        assert!(ensure_own_record(Role::Instructor, me, other).is_ok());
    }

    fn view_for(participant_id: Uuid) -> CertificateView {
        let issue_date = time::macros::date!(2025 - 01 - 10);
        CertificateView {
            certificate: Certificate {
                id: Uuid::new_v4(),
                certificate_code: format!("ATC-CRM1-2025-{}", participant_id.simple()),
                participant_id,
                session_id: Uuid::nil(),
                training_standard_id: Uuid::nil(),
                issue_date,
                expiry_date: issue_date,
                revoked_at: None,
                revocation_reason: None,
                created_at: time::OffsetDateTime::now_utc(),
            },
            status: CertificateStatus::Valid,
        }
    }

    #[test]
    fn test_trainee_sees_only_own_session_certificates() {
        let me = Uuid::new_v4();
        let classmate = Uuid::new_v4();
        let all = vec![view_for(classmate), view_for(me), view_for(classmate)];

        let mine = retain_visible(Role::Trainee, me, all.clone());
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].certificate.participant_id, me);

        assert_eq!(retain_visible(Role::Instructor, me, all.clone()).len(), 3);
        assert_eq!(retain_visible(Role::OrgAdmin, me, all).len(), 3);
    }

    #[test]
    fn test_revoke_reason_required() {
        let empty = RevokeRequest {
            reason: String::new(),
        };
        assert!(empty.validate().is_err());
    }
}
