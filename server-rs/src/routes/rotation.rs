use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::models::team::SkipRequest;
use crate::AppState;

pub async fn get_rotation(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> AppResult<Json<Value>> {
    let rotation = state.ledger.rotation(&team_id).await?;
    Ok(Json(json!({ "rotation": rotation })))
}

pub async fn skip(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    body: Option<Json<SkipRequest>>,
) -> AppResult<Json<Value>> {
    let expected_version = body.and_then(|Json(b)| b.expected_version);
    let rotation = state.ledger.skip(&team_id, expected_version).await?;
    Ok(Json(json!({ "rotation": rotation })))
}
