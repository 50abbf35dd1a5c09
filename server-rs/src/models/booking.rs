use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::player::Player;
use super::team::RotationView;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub team_id: String,
    #[serde(rename = "playerId")]
    pub player_id: Uuid,
    pub amount: i64,
    pub comment: String,
    pub date: NaiveDate,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Validated booking fields, shared by create and edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDraft {
    pub player_id: Uuid,
    pub amount: i64,
    pub comment: String,
    pub date: NaiveDate,
}

/// Both sides of an edit, so callers can see what moved between players.
#[derive(Debug, Clone)]
pub struct BookingChange {
    pub before: Booking,
    pub after: Booking,
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    /// Inclusive date range; applied only when both ends are known.
    pub range: Option<(NaiveDate, NaiveDate)>,
    pub limit: Option<i64>,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    #[serde(rename = "playerId")]
    pub player_id: Uuid,
    pub amount: i64,
    #[serde(default)]
    pub comment: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct EditBookingRequest {
    #[serde(rename = "playerId")]
    pub player_id: Uuid,
    pub amount: i64,
    #[serde(default)]
    pub comment: String,
    pub date: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookingQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingPage {
    pub bookings: Vec<Booking>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedBooking {
    pub booking: Booking,
    pub player: Player,
    /// Absent when the booking committed but the follow-up advance failed.
    pub rotation: Option<RotationView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditedBooking {
    pub booking: Booking,
    #[serde(rename = "previousPlayerId")]
    pub previous_player_id: Uuid,
    #[serde(rename = "previousAmount")]
    pub previous_amount: i64,
}
