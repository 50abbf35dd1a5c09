use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::LedgerStore;
use crate::error::{AppError, AppResult};
use crate::models::{
    Booking, BookingChange, BookingDraft, BookingFilter, NewTeam, Player, PlayerRemoval,
    RotationState, Team,
};
use crate::services::rotation;

const ACTIVE_PLAYERS_SQL: &str = "SELECT * FROM players WHERE team_id = $1 AND NOT is_deleted ORDER BY sort_order, created_at, id";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

async fn lock_team(tx: &mut Transaction<'_, Postgres>, team_id: &str) -> AppResult<Team> {
    sqlx::query_as("SELECT * FROM teams WHERE id = $1 AND is_active FOR UPDATE")
        .bind(team_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Team not found".into()))
}

/// Booking writes hold the team row shared; player deletion and reconcile take it exclusively.
async fn share_team(tx: &mut Transaction<'_, Postgres>, team_id: &str) -> AppResult<()> {
    sqlx::query_scalar::<_, String>("SELECT id FROM teams WHERE id = $1 AND is_active FOR SHARE")
        .bind(team_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Team not found".into()))?;
    Ok(())
}

async fn lock_booking(
    tx: &mut Transaction<'_, Postgres>,
    team_id: &str,
    booking_id: Uuid,
) -> AppResult<Booking> {
    sqlx::query_as("SELECT * FROM bookings WHERE id = $1 AND team_id = $2 FOR UPDATE")
        .bind(booking_id)
        .bind(team_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".into()))
}

/// Locks the listed active players in id order so concurrent edits cannot deadlock.
async fn lock_active_players(
    tx: &mut Transaction<'_, Postgres>,
    team_id: &str,
    ids: &[Uuid],
) -> AppResult<Vec<Player>> {
    let rows = sqlx::query_as(
        "SELECT * FROM players WHERE team_id = $1 AND id = ANY($2) AND NOT is_deleted ORDER BY id FOR UPDATE",
    )
    .bind(team_id)
    .bind(ids)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

async fn adjust_total(
    tx: &mut Transaction<'_, Postgres>,
    player_id: Uuid,
    delta: i64,
) -> AppResult<Player> {
    let player =
        sqlx::query_as("UPDATE players SET total_spent = total_spent + $1 WHERE id = $2 RETURNING *")
            .bind(delta)
            .bind(player_id)
            .fetch_one(&mut **tx)
            .await?;
    Ok(player)
}

fn team_id_taken(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Team id already taken".into())
        }
        _ => AppError::Database(e),
    }
}

async fn active_count(tx: &mut Transaction<'_, Postgres>, team_id: &str) -> AppResult<usize> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM players WHERE team_id = $1 AND NOT is_deleted")
            .bind(team_id)
            .fetch_one(&mut **tx)
            .await?;
    Ok(count as usize)
}

async fn write_pointer(
    tx: &mut Transaction<'_, Postgres>,
    team_id: &str,
    pointer: i32,
) -> AppResult<(i32, i64)> {
    let row = sqlx::query_as(
        "UPDATE teams SET current_player_index = $2, rotation_version = rotation_version + 1 WHERE id = $1 RETURNING current_player_index, rotation_version",
    )
    .bind(team_id)
    .bind(pointer)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row)
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.db)
            .await
            .is_ok()
    }

    async fn create_team(&self, new_team: NewTeam) -> AppResult<(Team, Vec<Player>)> {
        let mut tx = self.db.begin().await?;

        let team: Team = sqlx::query_as(
            r#"INSERT INTO teams (id, name, created_at, current_player_index, rotation_version, is_active)
            VALUES ($1, $2, NOW(), 0, 0, TRUE)
            RETURNING *"#,
        )
        .bind(&new_team.id)
        .bind(&new_team.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(team_id_taken)?;

        let mut players = Vec::with_capacity(new_team.player_names.len());
        for (order, name) in new_team.player_names.iter().enumerate() {
            let player: Player = sqlx::query_as(
                r#"INSERT INTO players (id, team_id, name, total_spent, sort_order, created_at, is_deleted)
                VALUES ($1, $2, $3, 0, $4, NOW(), FALSE)
                RETURNING *"#,
            )
            .bind(Uuid::new_v4())
            .bind(&new_team.id)
            .bind(name)
            .bind(order as i32)
            .fetch_one(&mut *tx)
            .await?;
            players.push(player);
        }

        tx.commit().await?;
        Ok((team, players))
    }

    async fn get_team(&self, team_id: &str) -> AppResult<Team> {
        sqlx::query_as("SELECT * FROM teams WHERE id = $1 AND is_active")
            .bind(team_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Team not found".into()))
    }

    async fn active_players(&self, team_id: &str) -> AppResult<Vec<Player>> {
        let players = sqlx::query_as(ACTIVE_PLAYERS_SQL)
            .bind(team_id)
            .fetch_all(&self.db)
            .await?;
        Ok(players)
    }

    async fn add_player(&self, team_id: &str, name: &str) -> AppResult<Player> {
        let mut tx = self.db.begin().await?;
        lock_team(&mut tx, team_id).await?;

        let sort_order: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM players WHERE team_id = $1",
        )
        .bind(team_id)
        .fetch_one(&mut *tx)
        .await?;

        let player: Player = sqlx::query_as(
            r#"INSERT INTO players (id, team_id, name, total_spent, sort_order, created_at, is_deleted)
            VALUES ($1, $2, $3, 0, $4, NOW(), FALSE)
            RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(name)
        .bind(sort_order)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(player)
    }

    async fn rename_player(&self, team_id: &str, player_id: Uuid, name: &str) -> AppResult<Player> {
        sqlx::query_as(
            "UPDATE players SET name = $1 WHERE id = $2 AND team_id = $3 AND NOT is_deleted RETURNING *",
        )
        .bind(name)
        .bind(player_id)
        .bind(team_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Player not found".into()))
    }

    async fn delete_player(&self, team_id: &str, player_id: Uuid) -> AppResult<PlayerRemoval> {
        let mut tx = self.db.begin().await?;
        let team = lock_team(&mut tx, team_id).await?;

        let active: Vec<Player> = sqlx::query_as(ACTIVE_PLAYERS_SQL)
            .bind(team_id)
            .fetch_all(&mut *tx)
            .await?;
        let position = active
            .iter()
            .position(|p| p.id == player_id)
            .ok_or_else(|| AppError::NotFound("Player not found".into()))?;

        let player: Player =
            sqlx::query_as("UPDATE players SET is_deleted = TRUE WHERE id = $1 RETURNING *")
                .bind(player_id)
                .fetch_one(&mut *tx)
                .await?;

        let bookings_removed = sqlx::query("DELETE FROM bookings WHERE team_id = $1 AND player_id = $2")
            .bind(team_id)
            .bind(player_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let next = rotation::after_removal(team.current_player_index, position, active.len());
        let (pointer, version) = if next != team.current_player_index {
            write_pointer(&mut tx, team_id, next).await?
        } else {
            (team.current_player_index, team.rotation_version)
        };

        tx.commit().await?;
        Ok(PlayerRemoval {
            player,
            bookings_removed,
            rotation: RotationState {
                pointer,
                version,
                active_count: active.len() - 1,
            },
        })
    }

    async fn list_bookings(&self, team_id: &str, filter: &BookingFilter) -> AppResult<Vec<Booking>> {
        let (from, to) = match filter.range {
            Some((from, to)) => (Some(from), Some(to)),
            None => (None, None),
        };

        let bookings = sqlx::query_as(
            r#"SELECT * FROM bookings
            WHERE team_id = $1
              AND ($2::date IS NULL OR date >= $2)
              AND ($3::date IS NULL OR date <= $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5"#,
        )
        .bind(team_id)
        .bind(from)
        .bind(to)
        .bind(filter.limit)
        .bind(filter.offset.max(0))
        .fetch_all(&self.db)
        .await?;
        Ok(bookings)
    }

    async fn insert_booking(
        &self,
        team_id: &str,
        draft: BookingDraft,
    ) -> AppResult<(Booking, Player)> {
        let mut tx = self.db.begin().await?;
        share_team(&mut tx, team_id).await?;

        let locked = lock_active_players(&mut tx, team_id, &[draft.player_id]).await?;
        if locked.is_empty() {
            return Err(AppError::NotFound("Player not found".into()));
        }

        let booking: Booking = sqlx::query_as(
            r#"INSERT INTO bookings (id, team_id, player_id, amount, comment, date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(draft.player_id)
        .bind(draft.amount)
        .bind(&draft.comment)
        .bind(draft.date)
        .fetch_one(&mut *tx)
        .await?;

        let player = adjust_total(&mut tx, draft.player_id, draft.amount).await?;

        tx.commit().await?;
        Ok((booking, player))
    }

    async fn update_booking(
        &self,
        team_id: &str,
        booking_id: Uuid,
        draft: BookingDraft,
    ) -> AppResult<BookingChange> {
        let mut tx = self.db.begin().await?;
        share_team(&mut tx, team_id).await?;

        let before = lock_booking(&mut tx, team_id, booking_id).await?;
        let locked =
            lock_active_players(&mut tx, team_id, &[before.player_id, draft.player_id]).await?;

        if !locked.iter().any(|p| p.id == draft.player_id) {
            return Err(AppError::NotFound("Player not found".into()));
        }
        if locked.iter().any(|p| p.id == before.player_id) {
            adjust_total(&mut tx, before.player_id, -before.amount).await?;
        }
        adjust_total(&mut tx, draft.player_id, draft.amount).await?;

        let after: Booking = sqlx::query_as(
            r#"UPDATE bookings SET player_id = $1, amount = $2, comment = $3, date = $4
            WHERE id = $5
            RETURNING *"#,
        )
        .bind(draft.player_id)
        .bind(draft.amount)
        .bind(&draft.comment)
        .bind(draft.date)
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(BookingChange { before, after })
    }

    async fn remove_booking(&self, team_id: &str, booking_id: Uuid) -> AppResult<Booking> {
        let mut tx = self.db.begin().await?;
        share_team(&mut tx, team_id).await?;

        let booking = lock_booking(&mut tx, team_id, booking_id).await?;
        let locked = lock_active_players(&mut tx, team_id, &[booking.player_id]).await?;
        if !locked.is_empty() {
            adjust_total(&mut tx, booking.player_id, -booking.amount).await?;
        }

        sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(booking)
    }

    async fn advance_rotation(
        &self,
        team_id: &str,
        expected_version: Option<i64>,
    ) -> AppResult<RotationState> {
        let mut tx = self.db.begin().await?;
        let team = lock_team(&mut tx, team_id).await?;

        if let Some(expected) = expected_version {
            if expected != team.rotation_version {
                return Err(AppError::Conflict("Rotation changed, reload and retry".into()));
            }
        }

        let active = active_count(&mut tx, team_id).await?;
        let next = rotation::advance(team.current_player_index, active)
            .ok_or_else(|| AppError::Conflict("Team has no active players".into()))?;
        let (pointer, version) = write_pointer(&mut tx, team_id, next).await?;

        tx.commit().await?;
        Ok(RotationState {
            pointer,
            version,
            active_count: active,
        })
    }

    async fn reconcile_totals(&self, team_id: &str) -> AppResult<Vec<Player>> {
        let mut tx = self.db.begin().await?;
        // Exclusive: booking writes must not commit between the sums and the update.
        lock_team(&mut tx, team_id).await?;

        let changed = sqlx::query_as(
            r#"UPDATE players p SET total_spent = s.total
            FROM (
                SELECT pl.id,
                       COALESCE((SELECT SUM(b.amount) FROM bookings b WHERE b.player_id = pl.id), 0)::bigint AS total
                FROM players pl
                WHERE pl.team_id = $1 AND NOT pl.is_deleted
            ) s
            WHERE p.id = s.id AND p.total_spent <> s.total
            RETURNING p.*"#,
        )
        .bind(team_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(changed)
    }
}
