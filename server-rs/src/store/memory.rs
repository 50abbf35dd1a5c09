use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::LedgerStore;
use crate::error::{AppError, AppResult};
use crate::models::{
    Booking, BookingChange, BookingDraft, BookingFilter, NewTeam, Player, PlayerRemoval,
    RotationState, Team,
};
use crate::services::rotation;

struct TeamState {
    team: Team,
    /// Every player ever added, tombstoned ones included.
    players: Vec<Player>,
    /// Insertion order.
    bookings: Vec<Booking>,
}

impl TeamState {
    fn active_players(&self) -> Vec<Player> {
        let mut active: Vec<Player> = self
            .players
            .iter()
            .filter(|p| !p.is_deleted)
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then(a.created_at.cmp(&b.created_at))
        });
        active
    }

    fn player_mut(&mut self, player_id: Uuid) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    fn active_player_mut(&mut self, player_id: Uuid) -> Option<&mut Player> {
        self.player_mut(player_id).filter(|p| !p.is_deleted)
    }

    fn rotation(&self) -> RotationState {
        RotationState {
            pointer: self.team.current_player_index,
            version: self.team.rotation_version,
            active_count: self.players.iter().filter(|p| !p.is_deleted).count(),
        }
    }
}

/// In-process store: one write lock serializes every mutation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    teams: Arc<RwLock<HashMap<String, TeamState>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn team_not_found() -> AppError {
    AppError::NotFound("Team not found".into())
}

fn player_not_found() -> AppError {
    AppError::NotFound("Player not found".into())
}

fn booking_not_found() -> AppError {
    AppError::NotFound("Booking not found".into())
}

fn lookup<'a>(
    teams: &'a HashMap<String, TeamState>,
    team_id: &str,
) -> AppResult<&'a TeamState> {
    teams
        .get(team_id)
        .filter(|s| s.team.is_active)
        .ok_or_else(team_not_found)
}

fn lookup_mut<'a>(
    teams: &'a mut HashMap<String, TeamState>,
    team_id: &str,
) -> AppResult<&'a mut TeamState> {
    teams
        .get_mut(team_id)
        .filter(|s| s.team.is_active)
        .ok_or_else(team_not_found)
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn ping(&self) -> bool {
        true
    }

    async fn create_team(&self, new_team: NewTeam) -> AppResult<(Team, Vec<Player>)> {
        let mut teams = self.teams.write().await;
        if teams.contains_key(&new_team.id) {
            return Err(AppError::Conflict("Team id already taken".into()));
        }

        let now = Utc::now();
        let team = Team {
            id: new_team.id.clone(),
            name: new_team.name,
            created_at: now,
            current_player_index: 0,
            rotation_version: 0,
            is_active: true,
        };
        let players: Vec<Player> = new_team
            .player_names
            .into_iter()
            .enumerate()
            .map(|(order, name)| Player {
                id: Uuid::new_v4(),
                team_id: new_team.id.clone(),
                name,
                total_spent: 0,
                sort_order: order as i32,
                created_at: now,
                is_deleted: false,
            })
            .collect();

        teams.insert(
            new_team.id,
            TeamState {
                team: team.clone(),
                players: players.clone(),
                bookings: Vec::new(),
            },
        );
        Ok((team, players))
    }

    async fn get_team(&self, team_id: &str) -> AppResult<Team> {
        let teams = self.teams.read().await;
        Ok(lookup(&teams, team_id)?.team.clone())
    }

    async fn active_players(&self, team_id: &str) -> AppResult<Vec<Player>> {
        let teams = self.teams.read().await;
        Ok(lookup(&teams, team_id)?.active_players())
    }

    async fn add_player(&self, team_id: &str, name: &str) -> AppResult<Player> {
        let mut teams = self.teams.write().await;
        let state = lookup_mut(&mut teams, team_id)?;

        let sort_order = state
            .players
            .iter()
            .map(|p| p.sort_order + 1)
            .max()
            .unwrap_or(0);
        let player = Player {
            id: Uuid::new_v4(),
            team_id: team_id.to_string(),
            name: name.to_string(),
            total_spent: 0,
            sort_order,
            created_at: Utc::now(),
            is_deleted: false,
        };
        state.players.push(player.clone());
        Ok(player)
    }

    async fn rename_player(&self, team_id: &str, player_id: Uuid, name: &str) -> AppResult<Player> {
        let mut teams = self.teams.write().await;
        let state = lookup_mut(&mut teams, team_id)?;
        let player = state
            .active_player_mut(player_id)
            .ok_or_else(player_not_found)?;
        player.name = name.to_string();
        Ok(player.clone())
    }

    async fn delete_player(&self, team_id: &str, player_id: Uuid) -> AppResult<PlayerRemoval> {
        let mut teams = self.teams.write().await;
        let state = lookup_mut(&mut teams, team_id)?;

        let active = state.active_players();
        let position = active
            .iter()
            .position(|p| p.id == player_id)
            .ok_or_else(player_not_found)?;

        let player = state
            .active_player_mut(player_id)
            .ok_or_else(player_not_found)?;
        player.is_deleted = true;
        let player = player.clone();

        let before = state.bookings.len();
        state.bookings.retain(|b| b.player_id != player_id);
        let bookings_removed = (before - state.bookings.len()) as u64;

        let next = rotation::after_removal(state.team.current_player_index, position, active.len());
        if next != state.team.current_player_index {
            state.team.current_player_index = next;
            state.team.rotation_version += 1;
        }

        Ok(PlayerRemoval {
            player,
            bookings_removed,
            rotation: state.rotation(),
        })
    }

    async fn list_bookings(&self, team_id: &str, filter: &BookingFilter) -> AppResult<Vec<Booking>> {
        let teams = self.teams.read().await;
        let state = lookup(&teams, team_id)?;

        let mut bookings: Vec<Booking> = state
            .bookings
            .iter()
            .rev()
            .filter(|b| match filter.range {
                Some((from, to)) => b.date >= from && b.date <= to,
                None => true,
            })
            .cloned()
            .collect();
        // Stable sort keeps later inserts first among equal timestamps.
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = filter.offset.max(0) as usize;
        let page = bookings.into_iter().skip(offset);
        Ok(match filter.limit {
            Some(limit) => page.take(limit.max(0) as usize).collect(),
            None => page.collect(),
        })
    }

    async fn insert_booking(
        &self,
        team_id: &str,
        draft: BookingDraft,
    ) -> AppResult<(Booking, Player)> {
        let mut teams = self.teams.write().await;
        let state = lookup_mut(&mut teams, team_id)?;

        let player = state
            .active_player_mut(draft.player_id)
            .ok_or_else(player_not_found)?;
        player.total_spent += draft.amount;
        let player = player.clone();

        let booking = Booking {
            id: Uuid::new_v4(),
            team_id: team_id.to_string(),
            player_id: draft.player_id,
            amount: draft.amount,
            comment: draft.comment,
            date: draft.date,
            created_at: Utc::now(),
        };
        state.bookings.push(booking.clone());
        Ok((booking, player))
    }

    async fn update_booking(
        &self,
        team_id: &str,
        booking_id: Uuid,
        draft: BookingDraft,
    ) -> AppResult<BookingChange> {
        let mut teams = self.teams.write().await;
        let state = lookup_mut(&mut teams, team_id)?;

        // All checks happen before the first write.
        let index = state
            .bookings
            .iter()
            .position(|b| b.id == booking_id)
            .ok_or_else(booking_not_found)?;
        if state.active_player_mut(draft.player_id).is_none() {
            return Err(player_not_found());
        }

        let before = state.bookings[index].clone();
        if let Some(old) = state.active_player_mut(before.player_id) {
            old.total_spent -= before.amount;
        }
        if let Some(new) = state.active_player_mut(draft.player_id) {
            new.total_spent += draft.amount;
        }

        let booking = &mut state.bookings[index];
        booking.player_id = draft.player_id;
        booking.amount = draft.amount;
        booking.comment = draft.comment;
        booking.date = draft.date;

        Ok(BookingChange {
            before,
            after: booking.clone(),
        })
    }

    async fn remove_booking(&self, team_id: &str, booking_id: Uuid) -> AppResult<Booking> {
        let mut teams = self.teams.write().await;
        let state = lookup_mut(&mut teams, team_id)?;

        let index = state
            .bookings
            .iter()
            .position(|b| b.id == booking_id)
            .ok_or_else(booking_not_found)?;
        let booking = state.bookings.remove(index);
        if let Some(player) = state.active_player_mut(booking.player_id) {
            player.total_spent -= booking.amount;
        }
        Ok(booking)
    }

    async fn advance_rotation(
        &self,
        team_id: &str,
        expected_version: Option<i64>,
    ) -> AppResult<RotationState> {
        let mut teams = self.teams.write().await;
        let state = lookup_mut(&mut teams, team_id)?;

        if let Some(expected) = expected_version {
            if expected != state.team.rotation_version {
                return Err(AppError::Conflict("Rotation changed, reload and retry".into()));
            }
        }

        let active = state.rotation().active_count;
        let next = rotation::advance(state.team.current_player_index, active)
            .ok_or_else(|| AppError::Conflict("Team has no active players".into()))?;
        state.team.current_player_index = next;
        state.team.rotation_version += 1;
        Ok(state.rotation())
    }

    async fn reconcile_totals(&self, team_id: &str) -> AppResult<Vec<Player>> {
        let mut teams = self.teams.write().await;
        let state = lookup_mut(&mut teams, team_id)?;

        let mut sums: HashMap<Uuid, i64> = HashMap::new();
        for booking in &state.bookings {
            *sums.entry(booking.player_id).or_default() += booking.amount;
        }

        let mut changed = Vec::new();
        for player in state.players.iter_mut().filter(|p| !p.is_deleted) {
            let expected = sums.get(&player.id).copied().unwrap_or(0);
            if player.total_spent != expected {
                player.total_spent = expected;
                changed.push(player.clone());
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Overwrites a cached total without touching bookings, to simulate drift.
    pub async fn corrupt_total(&self, team_id: &str, player_id: Uuid, total: i64) {
        let mut teams = self.teams.write().await;
        if let Some(player) = teams
            .get_mut(team_id)
            .and_then(|s| s.player_mut(player_id))
        {
            player.total_spent = total;
        }
    }
}
