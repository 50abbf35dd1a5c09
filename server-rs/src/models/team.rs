use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::player::Player;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "currentPlayerIndex")]
    pub current_player_index: i32,
    #[serde(rename = "rotationVersion")]
    pub rotation_version: i64,
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

/// Validated input for a new team: an already generated share id plus trimmed names.
#[derive(Debug, Clone)]
pub struct NewTeam {
    pub id: String,
    pub name: String,
    pub player_names: Vec<String>,
}

/// Rotation pointer as persisted, together with the active count it was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationState {
    pub pointer: i32,
    pub version: i64,
    pub active_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RotationView {
    /// `None` when the team has no active players.
    pub index: Option<usize>,
    pub version: i64,
    #[serde(rename = "currentPlayer")]
    pub current_player: Option<Player>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamView {
    pub team: Team,
    pub players: Vec<Player>,
    pub rotation: RotationView,
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub players: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SkipRequest {
    #[serde(rename = "expectedVersion")]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub team: Option<String>,
}
