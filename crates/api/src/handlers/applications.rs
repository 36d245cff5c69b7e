use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use engine::{ApplicationInstance, CandidateStage, NewApplication, TimelineEntry};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{ActingUser, ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationDto {
    pub form_name: String,
    #[serde(default)]
    pub form_data: Map<String, Value>,
}

/// Submit a new application. The submitter is optional.
pub async fn create(
    State(state): State<AppState>,
    actor: Option<ActingUser>,
    Json(payload): Json<CreateApplicationDto>,
) -> Result<(StatusCode, Json<ApplicationInstance>), ApiError> {
    let request = NewApplication {
        form_name: payload.form_name,
        form_data: payload.form_data,
        submitted_by: actor.map(|ActingUser(id)| id),
    };
    let application = state.orchestrator.create_application(request).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

pub async fn timeline(
    Path(uuid): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Vec<TimelineEntry>>, ApiError> {
    Ok(Json(state.orchestrator.timeline(uuid).await?))
}

/// Stages the caller may move this application to next.
pub async fn transitions(
    Path(uuid): Path<Uuid>,
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
) -> Result<Json<Vec<CandidateStage>>, ApiError> {
    Ok(Json(state.orchestrator.available_transitions(uuid, actor).await?))
}
