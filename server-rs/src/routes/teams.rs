use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::models::team::*;
use crate::AppState;

pub async fn create_team(
    State(state): State<AppState>,
    Json(body): Json<CreateTeamRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let view = state.ledger.create_team(&body.name, &body.players).await?;
    let share_url = state.config.share_url(&view.team.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "team": view.team,
            "players": view.players,
            "rotation": view.rotation,
            "shareUrl": share_url,
        })),
    ))
}

pub async fn get_team(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> AppResult<Json<Value>> {
    let view = state.ledger.team(&team_id).await?;
    let share_url = state.config.share_url(&view.team.id);

    Ok(Json(json!({
        "team": view.team,
        "players": view.players,
        "rotation": view.rotation,
        "shareUrl": share_url,
    })))
}

/// `?team=<id>` opens that team; without it the client shows team creation.
pub async fn resolve(
    State(state): State<AppState>,
    Query(q): Query<ResolveQuery>,
) -> AppResult<Json<Value>> {
    let team_id = match q.team.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => return Ok(Json(json!({ "view": "create" }))),
    };

    let view = state.ledger.team(team_id).await?;
    let share_url = state.config.share_url(&view.team.id);
    Ok(Json(json!({
        "view": "team",
        "team": view.team,
        "players": view.players,
        "rotation": view.rotation,
        "shareUrl": share_url,
    })))
}
