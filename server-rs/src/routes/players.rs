use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::models::player::*;
use crate::routes::parse_id;
use crate::AppState;

pub async fn list_players(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> AppResult<Json<Value>> {
    let players = state.ledger.players(&team_id).await?;
    Ok(Json(json!({ "players": players })))
}

pub async fn add_player(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(body): Json<PlayerNameRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let player = state.ledger.add_player(&team_id, &body.name).await?;
    Ok((StatusCode::CREATED, Json(json!({ "player": player }))))
}

pub async fn rename_player(
    State(state): State<AppState>,
    Path((team_id, player_id)): Path<(String, String)>,
    Json(body): Json<PlayerNameRequest>,
) -> AppResult<Json<Value>> {
    let pid = parse_id(&player_id, "player")?;
    let player = state.ledger.rename_player(&team_id, pid, &body.name).await?;
    Ok(Json(json!({ "player": player })))
}

pub async fn delete_player(
    State(state): State<AppState>,
    Path((team_id, player_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let pid = parse_id(&player_id, "player")?;
    let removal = state.ledger.delete_player(&team_id, pid).await?;
    Ok(Json(json!(removal)))
}
