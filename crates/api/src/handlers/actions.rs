use actions::ActionDefinition;
use axum::{extract::State, Json};

use crate::{ApiError, AppState};

/// Validate an action config without running it.
pub async fn test(
    State(state): State<AppState>,
    Json(definition): Json<ActionDefinition>,
) -> Result<Json<ActionDefinition>, ApiError> {
    let normalized = state
        .orchestrator
        .test_action(&definition.action_type, &definition.config)?;
    Ok(Json(normalized))
}
