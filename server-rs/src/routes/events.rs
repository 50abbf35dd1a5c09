use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Duration;

use crate::error::AppResult;
use crate::AppState;

/// Server-sent stream of changes to one team, for live-updating clients.
pub async fn stream_team_events(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // 404 before opening a stream for a team that does not exist.
    state.ledger.team(&team_id).await?;
    let mut receiver = state.ledger.feed().subscribe();

    let stream = async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if event.team_id != team_id {
                        continue;
                    }
                    if let Ok(data) = serde_json::to_string(&event) {
                        yield Ok(Event::default().event("change").data(data));
                    }
                }
                // Clients refetch on any event, so dropped ones only delay a refresh.
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30))))
}
