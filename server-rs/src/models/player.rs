use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::team::RotationView;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Player {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub team_id: String,
    pub name: String,
    #[serde(rename = "totalSpent")]
    pub total_spent: i64,
    #[serde(rename = "sortOrder")]
    pub sort_order: i32,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub is_deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct PlayerNameRequest {
    #[serde(default)]
    pub name: String,
}

/// Outcome of a soft delete, as committed by the store.
#[derive(Debug, Clone)]
pub struct PlayerRemoval {
    pub player: Player,
    pub bookings_removed: u64,
    pub rotation: super::team::RotationState,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerRemovalView {
    #[serde(rename = "playerId")]
    pub player_id: Uuid,
    #[serde(rename = "bookingsRemoved")]
    pub bookings_removed: u64,
    pub rotation: RotationView,
}
