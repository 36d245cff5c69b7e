use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ApiError;

#[derive(Debug, Deserialize)]
pub struct MatchDto {
    pub record: Map<String, Value>,
    #[serde(default)]
    pub criteria: Value,
}

#[derive(Debug, Serialize)]
pub struct MatchResult {
    pub matches: bool,
}

pub async fn evaluate(Json(payload): Json<MatchDto>) -> Result<Json<MatchResult>, ApiError> {
    let matches = criteria::matches_value(&payload.record, &payload.criteria)?;
    Ok(Json(MatchResult { matches }))
}
