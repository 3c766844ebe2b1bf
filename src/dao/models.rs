use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::state::event::{EventKind, EventRecord, EventStatus};

/// One score submission for an event. Immutable once created; users may
/// submit several times and only the best is surfaced by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEntity {
    /// Event the score belongs to.
    pub event_id: String,
    /// Submitting user.
    pub user_id: String,
    /// Display name captured at submission time.
    pub username: String,
    /// Non-negative score; higher is better.
    pub score: u64,
    /// Completion time in milliseconds for race-type events; lower is better.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
    /// Wall-clock submission instant.
    #[serde(with = "time::serde::timestamp::milliseconds")]
    pub submitted_at: OffsetDateTime,
}

/// Per-(user, achievement) progress record. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntity {
    /// Owning user.
    pub user_id: String,
    /// Achievement from the static catalog.
    pub achievement_id: String,
    /// Accumulated progress; never decreases.
    pub progress: u64,
    /// True once `progress` reached the achievement requirement.
    pub completed: bool,
    /// Instant of the threshold crossing, set exactly once.
    #[serde(default, with = "time::serde::timestamp::milliseconds::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// True once the reward has been granted. Implies `completed`.
    pub claimed: bool,
}

impl ProgressEntity {
    /// Fresh record with zero progress.
    pub fn new(user_id: impl Into<String>, achievement_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            achievement_id: achievement_id.into(),
            progress: 0,
            completed: false,
            completed_at: None,
            claimed: false,
        }
    }
}

/// Atomic progress mutation applied at the storage boundary.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Owning user.
    pub user_id: String,
    /// Achievement to advance.
    pub achievement_id: String,
    /// Amount to add (increment mode) or the candidate absolute value.
    pub amount: u64,
    /// When false, `amount` replaces the stored progress if larger, keeping
    /// progress monotone for best-value style counters.
    pub increment: bool,
    /// Completion threshold from the achievement definition.
    pub requirement: u64,
}

/// Result of applying a [`ProgressUpdate`].
#[derive(Debug, Clone)]
pub struct ProgressOutcome {
    /// The record after the update.
    pub entity: ProgressEntity,
    /// True exactly once per (user, achievement): on the call that crossed
    /// the requirement threshold.
    pub newly_completed: bool,
}

/// Finished event kept in the bounded recent-history window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHistoryEntity {
    /// Event identifier.
    pub event_id: String,
    /// Which mini-activity it was.
    pub kind: EventKind,
    /// Final status; always `finished` for locally-owned events.
    pub status: EventStatus,
    /// Wall-clock start instant.
    #[serde(with = "time::serde::timestamp::milliseconds")]
    pub start_time: OffsetDateTime,
    /// Wall-clock end instant.
    #[serde(with = "time::serde::timestamp::milliseconds")]
    pub end_time: OffsetDateTime,
    /// Users who joined before it finished.
    pub participants: Vec<String>,
}

impl From<EventRecord> for EventHistoryEntity {
    fn from(record: EventRecord) -> Self {
        Self {
            event_id: record.id.to_string(),
            kind: record.kind,
            status: record.status,
            start_time: record.start_time,
            end_time: record.end_time,
            participants: record.participants.into_iter().collect(),
        }
    }
}
