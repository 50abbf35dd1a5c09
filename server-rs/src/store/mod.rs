//! Storage seam for the ledger.
//!
//! Every mutating method is one atomic unit: either all of its reads and writes
//! land or none do. Implementations must lock the rows they read-modify-write
//! (player totals, the team's rotation pointer) for the duration of the unit.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Booking, BookingChange, BookingDraft, BookingFilter, NewTeam, Player, PlayerRemoval,
    RotationState, Team,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn ping(&self) -> bool;

    async fn create_team(&self, team: NewTeam) -> AppResult<(Team, Vec<Player>)>;

    /// Active team by id.
    async fn get_team(&self, team_id: &str) -> AppResult<Team>;

    /// Non-deleted players in rotation order.
    async fn active_players(&self, team_id: &str) -> AppResult<Vec<Player>>;

    async fn add_player(&self, team_id: &str, name: &str) -> AppResult<Player>;

    async fn rename_player(&self, team_id: &str, player_id: Uuid, name: &str) -> AppResult<Player>;

    /// Tombstones the player, deletes its bookings and repairs the rotation pointer.
    async fn delete_player(&self, team_id: &str, player_id: Uuid) -> AppResult<PlayerRemoval>;

    /// Newest first.
    async fn list_bookings(&self, team_id: &str, filter: &BookingFilter) -> AppResult<Vec<Booking>>;

    /// Inserts the booking and adds its amount to the player's total.
    /// Returns the player row as written in the same unit.
    async fn insert_booking(&self, team_id: &str, draft: BookingDraft) -> AppResult<(Booking, Player)>;

    /// Moves the booking's contribution from its old player/amount to the new ones.
    async fn update_booking(
        &self,
        team_id: &str,
        booking_id: Uuid,
        draft: BookingDraft,
    ) -> AppResult<BookingChange>;

    /// Deletes the booking and subtracts its amount from the owning player.
    async fn remove_booking(&self, team_id: &str, booking_id: Uuid) -> AppResult<Booking>;

    /// Moves the pointer to the next active player. A stale `expected_version` is a conflict.
    async fn advance_rotation(
        &self,
        team_id: &str,
        expected_version: Option<i64>,
    ) -> AppResult<RotationState>;

    /// Rewrites cached totals from booking sums; returns the players that changed.
    async fn reconcile_totals(&self, team_id: &str) -> AppResult<Vec<Player>>;
}
