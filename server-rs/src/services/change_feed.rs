use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamEventKind {
    TeamCreated,
    PlayerAdded,
    PlayerRenamed,
    PlayerDeleted,
    BookingCreated,
    BookingUpdated,
    BookingDeleted,
    RotationChanged,
    TotalsReconciled,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamEvent {
    #[serde(rename = "teamId")]
    pub team_id: String,
    pub kind: TeamEventKind,
    /// Id of the player or booking the event is about, if any.
    #[serde(rename = "subjectId", skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub at: DateTime<Utc>,
}

/// Fan-out of team changes to every connected client of a team.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: Arc<broadcast::Sender<TeamEvent>>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TeamEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, team_id: &str, kind: TeamEventKind, subject_id: Option<String>) {
        // No subscribers is not an error.
        let _ = self.sender.send(TeamEvent {
            team_id: team_id.to_string(),
            kind,
            subject_id,
            at: Utc::now(),
        });
    }
}
