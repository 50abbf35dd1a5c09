use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub mod bookings;
pub mod events;
pub mod health;
pub mod players;
pub mod rotation;
pub mod statistics;
pub mod teams;

pub(crate) fn parse_id(raw: &str, what: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("Invalid {what} ID")))
}
