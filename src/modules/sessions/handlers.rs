use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::models::{
    Assessment, AssessmentInput, AssessmentResult, AttendanceStatus, Certificate,
    NewTrainingSession, SessionInstructor, SessionParticipant, SessionStatus, TrainingSession,
};
use crate::engine::roster::list_available;
use crate::engine::{
    Audited, AttendanceSummary, BulkRecordReport, CertificateView, IssuanceReport, RowOutcome,
    SessionTransition,
};
use crate::error::AppResult;
use crate::middleware::{ActingUser, Operation};
use crate::modules::certificates::handlers::retain_visible;
use crate::modules::{forward_audit, AuditedResponse};

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub to: SessionStatus,
}

#[derive(Debug, Deserialize)]
pub struct AttendanceRequest {
    pub status: AttendanceStatus,
}

#[derive(Debug, Deserialize)]
pub struct CandidatesRequest {
    pub candidates: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CandidatesResponse {
    pub available: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssessmentRequest {
    pub score: Option<f64>,
    pub result: Option<AssessmentResult>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkAssessmentRequest {
    pub rows: Vec<AssessmentInput>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BulkRowStatus {
    Recorded { assessment: Assessment },
    Rejected { kind: &'static str, message: String },
    RolledBack,
}

#[derive(Debug, Serialize)]
pub struct BulkRowResponse {
    pub participant_id: Uuid,
    #[serde(flatten)]
    pub status: BulkRowStatus,
}

#[derive(Debug, Serialize)]
pub struct BulkAssessmentResponse {
    pub session_id: Uuid,
    pub atomic: bool,
    pub recorded: usize,
    pub rows: Vec<BulkRowResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_error: Option<String>,
}

impl From<BulkRecordReport> for BulkAssessmentResponse {
    fn from(report: BulkRecordReport) -> Self {
        let recorded = report.recorded_count();
        let rows = report
            .rows
            .into_iter()
            .map(|row| BulkRowResponse {
                participant_id: row.participant_id,
                status: match row.outcome {
                    RowOutcome::Recorded(assessment) => BulkRowStatus::Recorded { assessment },
                    RowOutcome::Rejected(err) => BulkRowStatus::Rejected {
                        kind: err.kind(),
                        message: err.to_string(),
                    },
                    RowOutcome::RolledBack => BulkRowStatus::RolledBack,
                },
            })
            .collect();

        Self {
            session_id: report.session_id,
            atomic: report.atomic,
            recorded,
            rows,
            batch_error: report.batch_error.map(|err| err.to_string()),
        }
    }
}

// Sessions

pub async fn create_session(
    State(state): State<AppState>,
    acting: ActingUser,
    Json(input): Json<NewTrainingSession>,
) -> AppResult<(StatusCode, Json<AuditedResponse<TrainingSession>>)> {
    let actor = acting.require(Operation::ManageSessions)?;
    let created = state.engine.lifecycle.create_session(input, actor).await?;
    Ok((StatusCode::CREATED, forward_audit(created)))
}

pub async fn get_session(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<TrainingSession>> {
    acting.require(Operation::ViewSessions)?;
    let engine = &state.engine;
    let session = state
        .retry
        .run("get_session", move || engine.lifecycle.get_session(session_id))
        .await?;
    Ok(Json(session))
}

pub async fn delete_session(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<AuditedResponse<()>>> {
    let actor = acting.require(Operation::ManageSessions)?;
    let deleted = state.engine.lifecycle.delete_session(session_id, actor).await?;
    Ok(forward_audit(deleted))
}

pub async fn transition_session(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(session_id): Path<Uuid>,
    Json(body): Json<TransitionRequest>,
) -> AppResult<Json<AuditedResponse<SessionTransition>>> {
    let actor = acting.require(Operation::TransitionSession)?;
    let transition = state
        .engine
        .lifecycle
        .transition(session_id, body.to, actor)
        .await?;
    Ok(forward_audit(transition))
}

// Instructors

pub async fn list_instructors(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<Vec<SessionInstructor>>> {
    acting.require(Operation::ViewRoster)?;
    let engine = &state.engine;
    let instructors = state
        .retry
        .run("list_instructors", move || engine.roster.list_instructors(session_id))
        .await?;
    Ok(Json(instructors))
}

/// Filters a candidate pool down to instructors not yet on the session.
pub async fn available_instructors(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(session_id): Path<Uuid>,
    Json(body): Json<CandidatesRequest>,
) -> AppResult<Json<CandidatesResponse>> {
    acting.require(Operation::ManageInstructors)?;
    let assigned: Vec<Uuid> = state
        .engine
        .roster
        .list_instructors(session_id)
        .await?
        .into_iter()
        .map(|a| a.instructor_id)
        .collect();

    let available = list_available(body.candidates, &assigned, |id| *id);
    Ok(Json(CandidatesResponse { available }))
}

pub async fn assign_instructor(
    State(state): State<AppState>,
    acting: ActingUser,
    Path((session_id, instructor_id)): Path<(Uuid, Uuid)>,
) -> AppResult<(StatusCode, Json<AuditedResponse<SessionInstructor>>)> {
    let actor = acting.require(Operation::ManageInstructors)?;
    let assignment = state
        .engine
        .roster
        .assign_instructor(session_id, instructor_id, actor)
        .await?;
    Ok((StatusCode::CREATED, forward_audit(assignment)))
}

pub async fn remove_instructor(
    State(state): State<AppState>,
    acting: ActingUser,
    Path((session_id, instructor_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<AuditedResponse<bool>>> {
    let actor = acting.require(Operation::ManageInstructors)?;
    let removed = state
        .engine
        .roster
        .remove_instructor(session_id, instructor_id, actor)
        .await?;
    Ok(forward_audit(removed))
}

// Participants and attendance

pub async fn list_participants(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<Vec<SessionParticipant>>> {
    acting.require(Operation::ViewRoster)?;
    let engine = &state.engine;
    let participants = state
        .retry
        .run("list_participants", move || engine.roster.list_participants(session_id))
        .await?;
    Ok(Json(participants))
}

pub async fn enroll_participant(
    State(state): State<AppState>,
    acting: ActingUser,
    Path((session_id, participant_id)): Path<(Uuid, Uuid)>,
) -> AppResult<(StatusCode, Json<AuditedResponse<SessionParticipant>>)> {
    let actor = acting.require(Operation::ManageParticipants)?;
    let enrollment = state
        .engine
        .roster
        .enroll_participant(session_id, participant_id, actor)
        .await?;
    Ok((StatusCode::CREATED, forward_audit(enrollment)))
}

pub async fn remove_participant(
    State(state): State<AppState>,
    acting: ActingUser,
    Path((session_id, participant_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<AuditedResponse<SessionParticipant>>> {
    let actor = acting.require(Operation::ManageParticipants)?;
    let removed = state
        .engine
        .roster
        .remove_participant(session_id, participant_id, actor)
        .await?;
    Ok(forward_audit(removed))
}

pub async fn set_attendance(
    State(state): State<AppState>,
    acting: ActingUser,
    Path((session_id, participant_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<AttendanceRequest>,
) -> AppResult<Json<AuditedResponse<SessionParticipant>>> {
    let actor = *acting.require(Operation::RecordAttendance)?;
    let engine = &state.engine;
    let status = body.status;
    // Last write wins, so replaying the same status is harmless.
    let updated = state
        .retry
        .run("set_attendance", move || async move {
            engine
                .attendance
                .set_attendance(session_id, participant_id, status, &actor)
                .await
        })
        .await?;
    Ok(forward_audit(updated))
}

pub async fn attendance_summary(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<AttendanceSummary>> {
    acting.require(Operation::ViewRoster)?;
    let engine = &state.engine;
    let summary = state
        .retry
        .run("attendance_summary", move || engine.attendance.summarize(session_id))
        .await?;
    Ok(Json(summary))
}

// Assessments

pub async fn list_assessments(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<Vec<Assessment>>> {
    acting.require(Operation::ViewAssessments)?;
    let engine = &state.engine;
    let assessments = state
        .retry
        .run("list_assessments", move || engine.assessments.list_assessments(session_id))
        .await?;
    Ok(Json(assessments))
}

pub async fn record_assessment(
    State(state): State<AppState>,
    acting: ActingUser,
    Path((session_id, participant_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<AssessmentRequest>,
) -> AppResult<Json<AuditedResponse<Assessment>>> {
    let actor = *acting.require(Operation::RecordAssessments)?;
    let engine = &state.engine;
    let input = AssessmentInput {
        participant_id,
        score: body.score,
        result: body.result,
        remarks: body.remarks,
    };

    // Upsert: replaying overwrites the same row.
    let recorded = state
        .retry
        .run("record_assessment", move || {
            let input = input.clone();
            async move {
                engine
                    .assessments
                    .record_assessment(session_id, input, &actor)
                    .await
            }
        })
        .await?;
    Ok(forward_audit(recorded))
}

pub async fn bulk_record_assessments(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(session_id): Path<Uuid>,
    Json(body): Json<BulkAssessmentRequest>,
) -> AppResult<Json<AuditedResponse<BulkAssessmentResponse>>> {
    let actor = acting.require(Operation::RecordAssessments)?;
    let audited = state
        .engine
        .assessments
        .bulk_record(session_id, body.rows, actor)
        .await?;

    Ok(forward_audit(Audited::new(
        BulkAssessmentResponse::from(audited.value),
        audited.audit,
    )))
}

// Certificates

pub async fn issue_certificates(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<AuditedResponse<IssuanceReport>>> {
    let actor = acting.require(Operation::IssueCertificates)?;
    let report = state
        .engine
        .certificates
        .issue_certificates(session_id, actor)
        .await?;
    Ok(forward_audit(report))
}

pub async fn issue_certificate_for_participant(
    State(state): State<AppState>,
    acting: ActingUser,
    Path((session_id, participant_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<AuditedResponse<Certificate>>> {
    let actor = acting.require(Operation::IssueCertificates)?;
    let certificate = state
        .engine
        .certificates
        .issue_for_participant(session_id, participant_id, actor)
        .await?;
    Ok(forward_audit(certificate))
}

pub async fn list_session_certificates(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<Vec<CertificateView>>> {
    let actor = acting.require(Operation::ViewCertificates)?;
    let engine = &state.engine;
    let certificates = state
        .retry
        .run("list_session_certificates", move || {
            engine.certificates.list_for_session(session_id)
        })
        .await?;
    Ok(Json(retain_visible(actor.role, actor.user_id, certificates)))
}
