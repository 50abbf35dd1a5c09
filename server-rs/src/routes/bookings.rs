use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::models::booking::*;
use crate::routes::parse_id;
use crate::AppState;

pub async fn list_bookings(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Query(q): Query<BookingQuery>,
) -> AppResult<Json<Value>> {
    let page = state.ledger.bookings(&team_id, &q).await?;
    Ok(Json(json!(page)))
}

pub async fn create_booking(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    Json(body): Json<CreateBookingRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let recorded = state.ledger.create_booking(&team_id, body).await?;
    Ok((StatusCode::CREATED, Json(json!(recorded))))
}

pub async fn edit_booking(
    State(state): State<AppState>,
    Path((team_id, booking_id)): Path<(String, String)>,
    Json(body): Json<EditBookingRequest>,
) -> AppResult<Json<Value>> {
    let bid = parse_id(&booking_id, "booking")?;
    let edited = state.ledger.edit_booking(&team_id, bid, body).await?;
    Ok(Json(json!(edited)))
}

pub async fn delete_booking(
    State(state): State<AppState>,
    Path((team_id, booking_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let bid = parse_id(&booking_id, "booking")?;
    let booking = state.ledger.delete_booking(&team_id, bid).await?;
    Ok(Json(json!({ "success": true, "booking": booking })))
}
