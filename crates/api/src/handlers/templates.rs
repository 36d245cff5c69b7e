use axum::{
    extract::{Path, State},
    Json,
};
use engine::ApplicationTemplate;

use crate::{ApiError, AppState};

/// Validate and store a template, replacing any previous one for the form.
pub async fn save(
    State(state): State<AppState>,
    Json(template): Json<ApplicationTemplate>,
) -> Result<Json<ApplicationTemplate>, ApiError> {
    state.orchestrator.save_template(&template).await?;
    Ok(Json(template))
}

pub async fn get(
    Path(form_name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApplicationTemplate>, ApiError> {
    Ok(Json(state.orchestrator.template(&form_name).await?))
}
