use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::middleware::localization::{format_currency, LocaleInfo};
use crate::models::{Booking, Player};

#[derive(Debug, Clone, Serialize)]
pub struct PlayerBalance {
    #[serde(rename = "playerId")]
    pub player_id: Uuid,
    pub name: String,
    /// Spend within the selected bookings.
    pub balance: i64,
    /// How far behind the top spender this player is.
    pub difference: i64,
    #[serde(rename = "balanceFormatted")]
    pub balance_formatted: String,
    #[serde(rename = "differenceFormatted")]
    pub difference_formatted: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub lang: &'static str,
    #[serde(rename = "bookingCount")]
    pub booking_count: usize,
    pub total: i64,
    #[serde(rename = "totalFormatted")]
    pub total_formatted: String,
    pub players: Vec<PlayerBalance>,
}

/// Per-player spend over `bookings`, in the players' rotation order.
///
/// Bookings of players not in `players` (already deleted) are ignored.
pub fn summarize(
    players: &[Player],
    bookings: &[Booking],
    range: Option<(NaiveDate, NaiveDate)>,
    locale: &LocaleInfo,
) -> Statistics {
    let mut spent: HashMap<Uuid, i64> = players.iter().map(|p| (p.id, 0)).collect();
    let mut booking_count = 0;
    for booking in bookings {
        if let Some(sum) = spent.get_mut(&booking.player_id) {
            *sum += booking.amount;
            booking_count += 1;
        }
    }

    let max_spent = spent.values().copied().max().unwrap_or(0);
    let total: i64 = spent.values().sum();

    let balances = players
        .iter()
        .map(|p| {
            let balance = spent.get(&p.id).copied().unwrap_or(0);
            let difference = max_spent - balance;
            PlayerBalance {
                player_id: p.id,
                name: p.name.clone(),
                balance,
                difference,
                balance_formatted: format_currency(balance, locale),
                difference_formatted: format_currency(difference, locale),
            }
        })
        .collect();

    Statistics {
        from: range.map(|(from, _)| from),
        to: range.map(|(_, to)| to),
        lang: locale.lang,
        booking_count,
        total,
        total_formatted: format_currency(total, locale),
        players: balances,
    }
}
