//! Team, player and booking mutations.
//!
//! Every player carries a cached `total_spent` that must equal the sum of its
//! bookings. Each mutation below runs as one atomic store unit. Create and
//! delete adjust the total server-side inside the same unit as the booking
//! write; they never compute it from a total the client read earlier.
//!
//! Advancing the rotation after a booking is a separate step. If it fails,
//! the booking stays recorded and the caller gets no rotation back.

use chrono::{NaiveDate, Utc};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::localization::LocaleInfo;
use crate::models::*;
use crate::services::change_feed::{ChangeFeed, TeamEventKind};
use crate::services::rotation;
use crate::services::statistics::{self, Statistics};
use crate::store::LedgerStore;

pub const MAX_COMMENT_CHARS: usize = 500;
/// Per-booking ceiling; keeps every running total far inside `i64`.
pub const MAX_AMOUNT: i64 = 1_000_000_000;
pub const MAX_NAME_CHARS: usize = 100;
pub const MIN_TEAM_PLAYERS: usize = 2;
const MAX_PAGE_SIZE: i64 = 100;
const TEAM_ID_LEN: usize = 12;
const TEAM_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn validate_amount(amount: i64) -> AppResult<()> {
    if amount <= 0 {
        return Err(AppError::Validation("Amount must be a positive number".into()));
    }
    if amount > MAX_AMOUNT {
        return Err(AppError::Validation(format!(
            "Amount must be at most {MAX_AMOUNT}"
        )));
    }
    Ok(())
}

pub fn validate_comment(comment: &str) -> AppResult<()> {
    if comment.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::Validation(format!(
            "Comment is too long (maximum {MAX_COMMENT_CHARS} characters)"
        )));
    }
    Ok(())
}

/// Trimmed name, 1..=100 characters.
pub fn validate_name(what: &str, name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "{what} must be 1-{MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

/// Drops blank entries; at least two names must remain.
pub fn validate_roster(names: &[String]) -> AppResult<Vec<String>> {
    let names: Vec<String> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect();
    if names.len() < MIN_TEAM_PLAYERS {
        return Err(AppError::Validation(format!(
            "At least {MIN_TEAM_PLAYERS} persons are required"
        )));
    }
    for name in &names {
        validate_name("Player name", name)?;
    }
    Ok(names)
}

/// The date filter only applies when both ends are given.
pub fn date_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> AppResult<Option<(NaiveDate, NaiveDate)>> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(AppError::Validation(
            "'from' must not be after 'to'".into(),
        )),
        (Some(from), Some(to)) => Ok(Some((from, to))),
        _ => Ok(None),
    }
}

fn booking_draft(
    player_id: Uuid,
    amount: i64,
    comment: String,
    date: NaiveDate,
) -> AppResult<BookingDraft> {
    validate_amount(amount)?;
    validate_comment(&comment)?;
    Ok(BookingDraft {
        player_id,
        amount,
        comment,
        date,
    })
}

pub fn generate_team_id() -> String {
    let mut rng = rand::thread_rng();
    (0..TEAM_ID_LEN)
        .map(|_| TEAM_ID_ALPHABET[rng.gen_range(0..TEAM_ID_ALPHABET.len())] as char)
        .collect()
}

fn rotation_view(state: RotationState, players: &[Player]) -> RotationView {
    let index = rotation::current(state.pointer, players.len());
    RotationView {
        index,
        version: state.version,
        current_player: index.and_then(|i| players.get(i).cloned()),
    }
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    feed: ChangeFeed,
    page_size: i64,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, feed: ChangeFeed, page_size: i64) -> Self {
        Self {
            store,
            feed,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub async fn ping(&self) -> bool {
        self.store.ping().await
    }

    // --- Teams ---

    pub async fn create_team(&self, name: &str, player_names: &[String]) -> AppResult<TeamView> {
        let name = validate_name("Team name", name)?;
        let player_names = validate_roster(player_names)?;

        let (team, players) = self
            .store
            .create_team(NewTeam {
                id: generate_team_id(),
                name,
                player_names,
            })
            .await?;

        tracing::info!(team_id = %team.id, players = players.len(), "team created");
        self.feed.publish(&team.id, TeamEventKind::TeamCreated, None);

        let state = RotationState {
            pointer: team.current_player_index,
            version: team.rotation_version,
            active_count: players.len(),
        };
        Ok(TeamView {
            rotation: rotation_view(state, &players),
            team,
            players,
        })
    }

    pub async fn team(&self, team_id: &str) -> AppResult<TeamView> {
        let team = self.store.get_team(team_id).await?;
        let players = self.store.active_players(team_id).await?;
        let state = RotationState {
            pointer: team.current_player_index,
            version: team.rotation_version,
            active_count: players.len(),
        };
        Ok(TeamView {
            rotation: rotation_view(state, &players),
            team,
            players,
        })
    }

    // --- Players ---

    pub async fn players(&self, team_id: &str) -> AppResult<Vec<Player>> {
        self.store.get_team(team_id).await?;
        self.store.active_players(team_id).await
    }

    pub async fn add_player(&self, team_id: &str, name: &str) -> AppResult<Player> {
        let name = validate_name("Player name", name)?;
        let player = self.store.add_player(team_id, &name).await?;

        tracing::info!(team_id, player_id = %player.id, "player added");
        self.feed
            .publish(team_id, TeamEventKind::PlayerAdded, Some(player.id.to_string()));
        Ok(player)
    }

    pub async fn rename_player(&self, team_id: &str, player_id: Uuid, name: &str) -> AppResult<Player> {
        let name = validate_name("Player name", name)?;
        let player = self.store.rename_player(team_id, player_id, &name).await?;

        self.feed
            .publish(team_id, TeamEventKind::PlayerRenamed, Some(player_id.to_string()));
        Ok(player)
    }

    pub async fn delete_player(&self, team_id: &str, player_id: Uuid) -> AppResult<PlayerRemovalView> {
        let removal = self.store.delete_player(team_id, player_id).await?;

        tracing::info!(
            team_id,
            %player_id,
            bookings_removed = removal.bookings_removed,
            pointer = removal.rotation.pointer,
            "player deleted"
        );
        self.feed
            .publish(team_id, TeamEventKind::PlayerDeleted, Some(player_id.to_string()));

        let players = self.store.active_players(team_id).await?;
        Ok(PlayerRemovalView {
            player_id: removal.player.id,
            bookings_removed: removal.bookings_removed,
            rotation: rotation_view(removal.rotation, &players),
        })
    }

    // --- Rotation ---

    pub async fn rotation(&self, team_id: &str) -> AppResult<RotationView> {
        Ok(self.team(team_id).await?.rotation)
    }

    pub async fn skip(&self, team_id: &str, expected_version: Option<i64>) -> AppResult<RotationView> {
        let state = self.store.advance_rotation(team_id, expected_version).await?;
        tracing::info!(team_id, pointer = state.pointer, active = state.active_count, "rotation skipped");
        self.feed.publish(team_id, TeamEventKind::RotationChanged, None);

        let players = self.store.active_players(team_id).await?;
        Ok(rotation_view(state, &players))
    }

    // --- Bookings ---

    pub async fn bookings(&self, team_id: &str, query: &BookingQuery) -> AppResult<BookingPage> {
        self.store.get_team(team_id).await?;

        let limit = query.limit.unwrap_or(self.page_size).clamp(1, MAX_PAGE_SIZE);
        let filter = BookingFilter {
            range: date_range(query.from, query.to)?,
            // One extra row tells us whether another page exists.
            limit: Some(limit + 1),
            offset: query.offset.unwrap_or(0).max(0),
        };

        let mut bookings = self.store.list_bookings(team_id, &filter).await?;
        let has_more = bookings.len() as i64 > limit;
        bookings.truncate(limit as usize);
        Ok(BookingPage { bookings, has_more })
    }

    pub async fn create_booking(
        &self,
        team_id: &str,
        req: CreateBookingRequest,
    ) -> AppResult<RecordedBooking> {
        let date = req.date.unwrap_or_else(|| Utc::now().date_naive());
        let draft = booking_draft(req.player_id, req.amount, req.comment, date)?;

        let (booking, player) = self.store.insert_booking(team_id, draft).await?;
        tracing::info!(team_id, booking_id = %booking.id, player_id = %booking.player_id, amount = booking.amount, "booking created");
        self.feed
            .publish(team_id, TeamEventKind::BookingCreated, Some(booking.id.to_string()));

        // The booking is committed; from here on failures only cost the rotation.
        let rotation = match self.advance_after_booking(team_id).await {
            Ok(view) => Some(view),
            Err(e) => {
                tracing::warn!(team_id, booking_id = %booking.id, "booking recorded but rotation did not advance: {e}");
                None
            }
        };

        Ok(RecordedBooking {
            booking,
            player,
            rotation,
        })
    }

    async fn advance_after_booking(&self, team_id: &str) -> AppResult<RotationView> {
        let state = self.store.advance_rotation(team_id, None).await?;
        self.feed.publish(team_id, TeamEventKind::RotationChanged, None);
        let players = self.store.active_players(team_id).await?;
        Ok(rotation_view(state, &players))
    }

    pub async fn edit_booking(
        &self,
        team_id: &str,
        booking_id: Uuid,
        req: EditBookingRequest,
    ) -> AppResult<EditedBooking> {
        let draft = booking_draft(req.player_id, req.amount, req.comment, req.date)?;
        let change = self.store.update_booking(team_id, booking_id, draft).await?;

        tracing::info!(
            team_id,
            %booking_id,
            from_player = %change.before.player_id,
            to_player = %change.after.player_id,
            "booking updated"
        );
        self.feed
            .publish(team_id, TeamEventKind::BookingUpdated, Some(booking_id.to_string()));

        Ok(EditedBooking {
            previous_player_id: change.before.player_id,
            previous_amount: change.before.amount,
            booking: change.after,
        })
    }

    pub async fn delete_booking(&self, team_id: &str, booking_id: Uuid) -> AppResult<Booking> {
        let booking = self.store.remove_booking(team_id, booking_id).await?;

        tracing::info!(team_id, %booking_id, amount = booking.amount, "booking deleted");
        self.feed
            .publish(team_id, TeamEventKind::BookingDeleted, Some(booking_id.to_string()));
        Ok(booking)
    }

    // --- Reporting ---

    pub async fn statistics(
        &self,
        team_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        locale: &LocaleInfo,
    ) -> AppResult<Statistics> {
        let range = date_range(from, to)?;
        let players = self.players(team_id).await?;
        let bookings = self
            .store
            .list_bookings(
                team_id,
                &BookingFilter {
                    range,
                    limit: None,
                    offset: 0,
                },
            )
            .await?;
        Ok(statistics::summarize(&players, &bookings, range, locale))
    }

    pub async fn reconcile(&self, team_id: &str) -> AppResult<Vec<Player>> {
        let changed = self.store.reconcile_totals(team_id).await?;
        if !changed.is_empty() {
            tracing::warn!(team_id, players = changed.len(), "cached totals repaired");
            self.feed.publish(team_id, TeamEventKind::TotalsReconciled, None);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn ledger_with(store: MemoryStore) -> Ledger {
        Ledger::new(Arc::new(store), ChangeFeed::new(64), 12)
    }

    fn ledger() -> Ledger {
        ledger_with(MemoryStore::new())
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn create(player_id: Uuid, amount: i64, comment: &str, date: NaiveDate) -> CreateBookingRequest {
        CreateBookingRequest {
            player_id,
            amount,
            comment: comment.into(),
            date: Some(date),
        }
    }

    fn edit(player_id: Uuid, amount: i64, date: NaiveDate) -> EditBookingRequest {
        EditBookingRequest {
            player_id,
            amount,
            comment: String::new(),
            date,
        }
    }

    async fn total_of(ledger: &Ledger, team_id: &str, player_id: Uuid) -> i64 {
        ledger
            .players(team_id)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.id == player_id)
            .map(|p| p.total_spent)
            .unwrap()
    }

    async fn assert_totals_match_bookings(ledger: &Ledger, team_id: &str) {
        let players = ledger.players(team_id).await.unwrap();
        let bookings = ledger
            .store
            .list_bookings(team_id, &BookingFilter::default())
            .await
            .unwrap();
        let mut sums: HashMap<Uuid, i64> = HashMap::new();
        for b in &bookings {
            *sums.entry(b.player_id).or_default() += b.amount;
        }
        for p in players {
            assert_eq!(
                p.total_spent,
                sums.get(&p.id).copied().unwrap_or(0),
                "total drifted for {}",
                p.name
            );
        }
    }

    /// Deletes the booking's player right after the insert commits, as a
    /// concurrent request would.
    struct PlayerLeavesAfterInsert(MemoryStore);

    #[async_trait]
    impl LedgerStore for PlayerLeavesAfterInsert {
        async fn ping(&self) -> bool {
            self.0.ping().await
        }
        async fn create_team(&self, team: NewTeam) -> AppResult<(Team, Vec<Player>)> {
            self.0.create_team(team).await
        }
        async fn get_team(&self, team_id: &str) -> AppResult<Team> {
            self.0.get_team(team_id).await
        }
        async fn active_players(&self, team_id: &str) -> AppResult<Vec<Player>> {
            self.0.active_players(team_id).await
        }
        async fn add_player(&self, team_id: &str, name: &str) -> AppResult<Player> {
            self.0.add_player(team_id, name).await
        }
        async fn rename_player(&self, team_id: &str, player_id: Uuid, name: &str) -> AppResult<Player> {
            self.0.rename_player(team_id, player_id, name).await
        }
        async fn delete_player(&self, team_id: &str, player_id: Uuid) -> AppResult<PlayerRemoval> {
            self.0.delete_player(team_id, player_id).await
        }
        async fn list_bookings(&self, team_id: &str, filter: &BookingFilter) -> AppResult<Vec<Booking>> {
            self.0.list_bookings(team_id, filter).await
        }
        async fn insert_booking(
            &self,
            team_id: &str,
            draft: BookingDraft,
        ) -> AppResult<(Booking, Player)> {
            let inserted = self.0.insert_booking(team_id, draft).await?;
            self.0.delete_player(team_id, inserted.1.id).await?;
            Ok(inserted)
        }
        async fn update_booking(
            &self,
            team_id: &str,
            booking_id: Uuid,
            draft: BookingDraft,
        ) -> AppResult<BookingChange> {
            self.0.update_booking(team_id, booking_id, draft).await
        }
        async fn remove_booking(&self, team_id: &str, booking_id: Uuid) -> AppResult<Booking> {
            self.0.remove_booking(team_id, booking_id).await
        }
        async fn advance_rotation(
            &self,
            team_id: &str,
            expected_version: Option<i64>,
        ) -> AppResult<RotationState> {
            self.0.advance_rotation(team_id, expected_version).await
        }
        async fn reconcile_totals(&self, team_id: &str) -> AppResult<Vec<Player>> {
            self.0.reconcile_totals(team_id).await
        }
    }

    #[test]
    fn rejects_non_positive_amounts_and_long_comments() {
        assert!(validate_amount(0).is_err());
        assert!(validate_amount(-5).is_err());
        assert!(validate_amount(1).is_ok());
        assert!(validate_comment(&"x".repeat(500)).is_ok());
        assert!(validate_comment(&"x".repeat(501)).is_err());
        // Characters, not bytes.
        assert!(validate_comment(&"ø".repeat(500)).is_ok());
    }

    #[test]
    fn roster_drops_blank_names_and_needs_two() {
        assert_eq!(
            validate_roster(&names(&[" Ann ", "", "  ", "Bo"])).unwrap(),
            names(&["Ann", "Bo"])
        );
        assert!(validate_roster(&names(&["Ann", " "])).is_err());
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        assert!(date_range(Some(day(5)), Some(day(1))).is_err());
        assert_eq!(date_range(Some(day(1)), None).unwrap(), None);
        assert_eq!(date_range(Some(day(1)), Some(day(1))).unwrap(), Some((day(1), day(1))));
    }

    #[test]
    fn team_ids_are_short_base36() {
        let id = generate_team_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn booking_scenario_moves_totals_and_rotation() {
        let ledger = ledger();
        let team = ledger.create_team("Lunch crew", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();
        let (a, b) = (team.players[0].id, team.players[1].id);
        assert_eq!(team.rotation.current_player.as_ref().unwrap().id, a);

        let recorded = ledger
            .create_booking(&team_id, create(a, 100, "lunch", day(1)))
            .await
            .unwrap();
        assert_eq!(recorded.player.total_spent, 100);
        let rotation = recorded.rotation.unwrap();
        assert_eq!(rotation.current_player.unwrap().id, b);
        assert_eq!(rotation.version, 1);

        let booking_id = recorded.booking.id;
        let edited = ledger
            .edit_booking(&team_id, booking_id, edit(b, 150, day(1)))
            .await
            .unwrap();
        assert_eq!(edited.previous_player_id, a);
        assert_eq!(edited.previous_amount, 100);
        assert_eq!(total_of(&ledger, &team_id, a).await, 0);
        assert_eq!(total_of(&ledger, &team_id, b).await, 150);

        ledger.delete_booking(&team_id, booking_id).await.unwrap();
        assert_eq!(total_of(&ledger, &team_id, b).await, 0);
        assert_totals_match_bookings(&ledger, &team_id).await;
    }

    #[tokio::test]
    async fn invalid_booking_writes_nothing() {
        let ledger = ledger();
        let team = ledger.create_team("T", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();
        let a = team.players[0].id;

        let err = ledger.create_booking(&team_id, create(a, 0, "", day(1))).await;
        assert!(matches!(err, Err(AppError::Validation(_))));
        let long = "x".repeat(501);
        let err = ledger.create_booking(&team_id, create(a, 10, &long, day(1))).await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        assert_eq!(total_of(&ledger, &team_id, a).await, 0);
        let page = ledger.bookings(&team_id, &BookingQuery::default()).await.unwrap();
        assert!(page.bookings.is_empty());
        // Rotation did not move either.
        assert_eq!(ledger.rotation(&team_id).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn edit_to_unknown_player_changes_nothing() {
        let ledger = ledger();
        let team = ledger.create_team("T", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();
        let a = team.players[0].id;

        let booking = ledger
            .create_booking(&team_id, create(a, 40, "", day(2)))
            .await
            .unwrap()
            .booking;
        let err = ledger
            .edit_booking(&team_id, booking.id, edit(Uuid::new_v4(), 90, day(2)))
            .await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
        assert_eq!(total_of(&ledger, &team_id, a).await, 40);

        let err = ledger
            .edit_booking(&team_id, Uuid::new_v4(), edit(a, 90, day(2)))
            .await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
        let err = ledger.delete_booking(&team_id, Uuid::new_v4()).await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn editing_amount_in_place_adjusts_by_the_difference() {
        let ledger = ledger();
        let team = ledger.create_team("T", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();
        let a = team.players[0].id;

        let booking = ledger
            .create_booking(&team_id, create(a, 40, "", day(2)))
            .await
            .unwrap()
            .booking;
        ledger
            .edit_booking(&team_id, booking.id, edit(a, 25, day(3)))
            .await
            .unwrap();
        assert_eq!(total_of(&ledger, &team_id, a).await, 25);
    }

    #[tokio::test]
    async fn deleting_player_removes_bookings_and_keeps_pointer_valid() {
        let ledger = ledger();
        let team = ledger.create_team("T", &names(&["A", "B", "C"])).await.unwrap();
        let team_id = team.team.id.clone();
        let (a, b, c) = (team.players[0].id, team.players[1].id, team.players[2].id);

        // Two bookings move the pointer to C.
        ledger.create_booking(&team_id, create(a, 10, "", day(1))).await.unwrap();
        ledger.create_booking(&team_id, create(b, 20, "", day(1))).await.unwrap();
        assert_eq!(ledger.rotation(&team_id).await.unwrap().current_player.unwrap().id, c);

        let removal = ledger.delete_player(&team_id, a).await.unwrap();
        assert_eq!(removal.bookings_removed, 1);
        assert_eq!(removal.rotation.index, Some(1));
        assert_eq!(removal.rotation.current_player.unwrap().id, c);

        let players = ledger.players(&team_id).await.unwrap();
        assert_eq!(players.len(), 2);
        let page = ledger.bookings(&team_id, &BookingQuery::default()).await.unwrap();
        assert!(page.bookings.iter().all(|bk| bk.player_id != a));
        assert_totals_match_bookings(&ledger, &team_id).await;

        // Deleting the current player hands the turn to the next one.
        let removal = ledger.delete_player(&team_id, c).await.unwrap();
        assert_eq!(removal.rotation.current_player.unwrap().id, b);

        let removal = ledger.delete_player(&team_id, b).await.unwrap();
        assert_eq!(removal.rotation.index, None);
        assert!(removal.rotation.current_player.is_none());

        let err = ledger.skip(&team_id, None).await;
        assert!(matches!(err, Err(AppError::Conflict(_))));
        let err = ledger.delete_player(&team_id, b).await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[test]
    fn amounts_are_capped() {
        assert!(validate_amount(MAX_AMOUNT).is_ok());
        assert!(validate_amount(MAX_AMOUNT + 1).is_err());
        assert!(validate_amount(i64::MAX).is_err());
    }

    #[tokio::test]
    async fn oversized_amount_is_rejected_before_any_write() {
        let ledger = ledger();
        let team = ledger.create_team("T", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();
        let a = team.players[0].id;

        let err = ledger.create_booking(&team_id, create(a, i64::MAX, "", day(1))).await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        let booking = ledger
            .create_booking(&team_id, create(a, MAX_AMOUNT, "", day(1)))
            .await
            .unwrap()
            .booking;
        ledger.create_booking(&team_id, create(a, 1, "", day(1))).await.unwrap();
        assert_eq!(total_of(&ledger, &team_id, a).await, MAX_AMOUNT + 1);

        let err = ledger
            .edit_booking(&team_id, booking.id, edit(a, i64::MAX, day(1)))
            .await;
        assert!(matches!(err, Err(AppError::Validation(_))));
        assert_eq!(total_of(&ledger, &team_id, a).await, MAX_AMOUNT + 1);
    }

    #[tokio::test]
    async fn committed_booking_is_reported_even_if_player_leaves() {
        let ledger = Ledger::new(
            Arc::new(PlayerLeavesAfterInsert(MemoryStore::new())),
            ChangeFeed::new(64),
            12,
        );
        let team = ledger.create_team("T", &names(&["A", "B", "C"])).await.unwrap();
        let team_id = team.team.id.clone();
        let (a, b) = (team.players[0].id, team.players[1].id);

        let recorded = ledger
            .create_booking(&team_id, create(a, 30, "", day(1)))
            .await
            .unwrap();
        assert_eq!(recorded.booking.player_id, a);
        assert_eq!(recorded.player.id, a);
        assert_eq!(recorded.player.total_spent, 30);
        // A's removal left B current; the advance then passed the turn to C.
        assert_eq!(recorded.rotation.unwrap().current_player.unwrap().id, team.players[2].id);
        assert!(ledger.players(&team_id).await.unwrap().iter().all(|p| p.id != a));
        assert_eq!(total_of(&ledger, &team_id, b).await, 0);
    }

    #[tokio::test]
    async fn booking_for_deleted_player_is_rejected() {
        let ledger = ledger();
        let team = ledger.create_team("T", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();
        let a = team.players[0].id;

        ledger.delete_player(&team_id, a).await.unwrap();
        let err = ledger.create_booking(&team_id, create(a, 10, "", day(1))).await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn skip_with_stale_version_conflicts() {
        let ledger = ledger();
        let team = ledger.create_team("T", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();

        let rotation = ledger.skip(&team_id, Some(0)).await.unwrap();
        assert_eq!(rotation.version, 1);
        assert_eq!(rotation.index, Some(1));

        let err = ledger.skip(&team_id, Some(0)).await;
        assert!(matches!(err, Err(AppError::Conflict(_))));

        let rotation = ledger.skip(&team_id, None).await.unwrap();
        assert_eq!(rotation.index, Some(0));
    }

    #[tokio::test]
    async fn added_players_join_the_end_of_the_rotation() {
        let ledger = ledger();
        let team = ledger.create_team("T", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();

        let c = ledger.add_player(&team_id, "  C  ").await.unwrap();
        assert_eq!(c.name, "C");
        let players = ledger.players(&team_id).await.unwrap();
        assert_eq!(players.last().unwrap().id, c.id);

        let renamed = ledger.rename_player(&team_id, c.id, "Cy").await.unwrap();
        assert_eq!(renamed.name, "Cy");
        assert!(ledger.add_player(&team_id, "   ").await.is_err());
    }

    #[tokio::test]
    async fn bookings_page_newest_first_with_date_filter() {
        let ledger = ledger();
        let team = ledger.create_team("T", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();
        let a = team.players[0].id;

        for d in 1..=15 {
            ledger
                .create_booking(&team_id, create(a, d as i64, "", day(d)))
                .await
                .unwrap();
        }

        let page = ledger.bookings(&team_id, &BookingQuery::default()).await.unwrap();
        assert_eq!(page.bookings.len(), 12);
        assert!(page.has_more);
        assert_eq!(page.bookings[0].amount, 15);

        let filtered = ledger
            .bookings(
                &team_id,
                &BookingQuery {
                    from: Some(day(3)),
                    to: Some(day(5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered.bookings.len(), 3);
        assert!(!filtered.has_more);
    }

    #[tokio::test]
    async fn statistics_follow_date_range() {
        let ledger = ledger();
        let team = ledger.create_team("T", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();
        let (a, b) = (team.players[0].id, team.players[1].id);

        ledger.create_booking(&team_id, create(a, 1000, "", day(1))).await.unwrap();
        ledger.create_booking(&team_id, create(b, 300, "", day(10))).await.unwrap();

        let all = ledger
            .statistics(&team_id, None, None, &LocaleInfo::default())
            .await
            .unwrap();
        assert_eq!(all.players[1].difference, 700);
        assert_eq!(all.players[1].difference_formatted, "700 kr.");

        let later = ledger
            .statistics(&team_id, Some(day(5)), Some(day(31)), &LocaleInfo::default())
            .await
            .unwrap();
        assert_eq!(later.players[0].balance, 0);
        assert_eq!(later.players[0].difference, 300);
    }

    #[tokio::test]
    async fn reconcile_repairs_drifted_totals() {
        let store = MemoryStore::new();
        let ledger = ledger_with(store.clone());
        let team = ledger.create_team("T", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();
        let a = team.players[0].id;

        ledger.create_booking(&team_id, create(a, 70, "", day(1))).await.unwrap();
        store.corrupt_total(&team_id, a, 5).await;

        let changed = ledger.reconcile(&team_id).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(total_of(&ledger, &team_id, a).await, 70);
        assert!(ledger.reconcile(&team_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_bookings_do_not_lose_updates() {
        let ledger = ledger();
        let team = ledger.create_team("T", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();
        let a = team.players[0].id;

        let mut handles = Vec::new();
        for i in 1..=40 {
            let ledger = ledger.clone();
            let team_id = team_id.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .create_booking(&team_id, create(a, i, "", day(1)))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(total_of(&ledger, &team_id, a).await, (1..=40).sum::<i64>());
        assert_eq!(ledger.rotation(&team_id).await.unwrap().version, 40);
    }

    #[tokio::test]
    async fn random_mutation_sequences_keep_totals_consistent() {
        let ledger = ledger();
        let team = ledger
            .create_team("T", &names(&["A", "B", "C", "D"]))
            .await
            .unwrap();
        let team_id = team.team.id.clone();
        let mut rng = StdRng::seed_from_u64(7);
        let mut booking_ids: Vec<Uuid> = Vec::new();

        for _ in 0..300 {
            let players = ledger.players(&team_id).await.unwrap();
            let pick = players[rng.gen_range(0..players.len())].id;
            match rng.gen_range(0..4) {
                0 | 1 => {
                    let amount = rng.gen_range(-5..500);
                    if let Ok(r) = ledger
                        .create_booking(&team_id, create(pick, amount, "", day(rng.gen_range(1..28))))
                        .await
                    {
                        booking_ids.push(r.booking.id);
                    }
                }
                2 if !booking_ids.is_empty() => {
                    let id = booking_ids[rng.gen_range(0..booking_ids.len())];
                    let _ = ledger
                        .edit_booking(&team_id, id, edit(pick, rng.gen_range(1..500), day(2)))
                        .await;
                }
                3 if !booking_ids.is_empty() => {
                    let id = booking_ids.swap_remove(rng.gen_range(0..booking_ids.len()));
                    ledger.delete_booking(&team_id, id).await.unwrap();
                }
                _ => {}
            }
            assert_totals_match_bookings(&ledger, &team_id).await;
        }
    }

    #[tokio::test]
    async fn mutations_are_published_on_the_feed() {
        let ledger = ledger();
        let mut rx = ledger.feed().subscribe();
        let team = ledger.create_team("T", &names(&["A", "B"])).await.unwrap();
        let team_id = team.team.id.clone();
        ledger
            .create_booking(&team_id, create(team.players[0].id, 5, "", day(1)))
            .await
            .unwrap();

        let kinds: Vec<TeamEventKind> = (0..3).map(|_| rx.try_recv().unwrap().kind).collect();
        assert_eq!(
            kinds,
            vec![
                TeamEventKind::TeamCreated,
                TeamEventKind::BookingCreated,
                TeamEventKind::RotationChanged
            ]
        );
    }

    #[tokio::test]
    async fn unknown_team_is_not_found() {
        let ledger = ledger();
        assert!(matches!(ledger.team("nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(
            ledger.bookings("nope", &BookingQuery::default()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
