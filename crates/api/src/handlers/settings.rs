use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{ApiError, AppState};

/// Re-read the settings file behind `$_NAME_$` tokens.
pub async fn reload(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let settings = state
        .settings
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("no settings file is configured".into()))?;
    let count = settings.reload()?;
    Ok(Json(json!({ "count": count })))
}
