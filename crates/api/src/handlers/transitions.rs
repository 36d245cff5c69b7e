use axum::{extract::State, Json};
use engine::{TransitionReport, TransitionRequest};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ActingUser, ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDto {
    pub form_name: String,
    pub target_stage: String,
    pub applications: Vec<Uuid>,
}

/// Move a batch of applications to `targetStage`.
///
/// Partial failures still answer 200; the report lists them.
pub async fn apply(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(payload): Json<TransitionDto>,
) -> Result<Json<TransitionReport>, ApiError> {
    let request = TransitionRequest {
        form_name: payload.form_name,
        target_stage: payload.target_stage,
        applications: payload.applications,
        actor,
    };
    Ok(Json(state.orchestrator.transition(request).await?))
}
