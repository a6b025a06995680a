use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::models::{NewTrainingStandard, TrainingStandard, UpdateTrainingStandard};
use crate::error::AppResult;
use crate::middleware::{ActingUser, Operation};
use crate::modules::{forward_audit, AuditedResponse};

#[derive(Debug, Deserialize)]
pub struct ActivationRequest {
    pub is_active: bool,
}

pub async fn create_standard(
    State(state): State<AppState>,
    acting: ActingUser,
    Json(input): Json<NewTrainingStandard>,
) -> AppResult<(StatusCode, Json<AuditedResponse<TrainingStandard>>)> {
    let actor = acting.require(Operation::ManageStandards)?;
    let created = state.engine.catalog.create_standard(input, actor).await?;
    Ok((StatusCode::CREATED, forward_audit(created)))
}

pub async fn get_standard(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(standard_id): Path<Uuid>,
) -> AppResult<Json<TrainingStandard>> {
    acting.require(Operation::ViewStandards)?;
    let engine = &state.engine;
    let standard = state
        .retry
        .run("get_standard", move || engine.catalog.get_standard(standard_id))
        .await?;
    Ok(Json(standard))
}

pub async fn update_standard(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(standard_id): Path<Uuid>,
    Json(input): Json<UpdateTrainingStandard>,
) -> AppResult<Json<AuditedResponse<TrainingStandard>>> {
    let actor = acting.require(Operation::ManageStandards)?;
    let updated = state
        .engine
        .catalog
        .update_standard(standard_id, input, actor)
        .await?;
    Ok(forward_audit(updated))
}

pub async fn set_standard_active(
    State(state): State<AppState>,
    acting: ActingUser,
    Path(standard_id): Path<Uuid>,
    Json(body): Json<ActivationRequest>,
) -> AppResult<Json<AuditedResponse<TrainingStandard>>> {
    let actor = acting.require(Operation::ManageStandards)?;
    let updated = state
        .engine
        .catalog
        .set_standard_active(standard_id, body.is_active, actor)
        .await?;
    Ok(forward_audit(updated))
}
