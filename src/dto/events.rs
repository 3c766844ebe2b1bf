use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use validator::Validate;

use crate::dao::models::EventHistoryEntity;
use crate::state::event::{EventKind, EventRecord, EventStatus};

/// Wire snapshot of an event, with instants flattened to unix milliseconds
/// and the remaining time pre-computed for HUD banners.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventSnapshot {
    /// Event identifier.
    pub id: String,
    /// Which mini-activity this is.
    #[schema(value_type = String)]
    pub kind: EventKind,
    /// Current lifecycle status.
    #[schema(value_type = String)]
    pub status: EventStatus,
    /// Start instant, unix milliseconds.
    pub start_time_ms: i64,
    /// End instant, unix milliseconds.
    pub end_time_ms: i64,
    /// Planned length in milliseconds.
    pub duration_ms: u64,
    /// Users who joined.
    pub participants: Vec<String>,
    /// Pre-start countdown in seconds, when one is running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_secs: Option<u64>,
    /// Milliseconds until the event ends, zero once over.
    pub time_remaining_ms: u64,
}

impl EventSnapshot {
    /// Snapshot a record against the given clock.
    pub fn from_record(record: &EventRecord, now: OffsetDateTime) -> Self {
        Self {
            id: record.id.to_string(),
            kind: record.kind,
            status: record.status,
            start_time_ms: (record.start_time.unix_timestamp_nanos() / 1_000_000) as i64,
            end_time_ms: (record.end_time.unix_timestamp_nanos() / 1_000_000) as i64,
            duration_ms: record.duration.as_millis() as u64,
            participants: record.participants.iter().cloned().collect(),
            countdown_secs: record.countdown_secs,
            time_remaining_ms: record.time_remaining_ms(now),
        }
    }
}

/// Response for the current-event endpoint; `event` is null between events.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentEventResponse {
    /// The running or announced event, if any.
    pub event: Option<EventSnapshot>,
}

/// Body for joining an active event.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct JoinEventRequest {
    /// Joining user.
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
}

/// Body for submitting a final score.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitScoreRequest {
    /// Submitting user.
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    /// Display name shown on leaderboards.
    #[validate(length(min = 1, max = 32))]
    pub username: String,
    /// Final score, higher is better.
    pub score: u64,
    /// Completion time in milliseconds for race-type events.
    pub time_ms: Option<u64>,
}

/// One finished event from the bounded history window.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventHistorySnapshot {
    /// Event identifier.
    pub event_id: String,
    /// Which mini-activity it was.
    #[schema(value_type = String)]
    pub kind: EventKind,
    /// Start instant, unix milliseconds.
    pub start_time_ms: i64,
    /// End instant, unix milliseconds.
    pub end_time_ms: i64,
    /// Users who joined.
    pub participants: Vec<String>,
}

impl From<EventHistoryEntity> for EventHistorySnapshot {
    fn from(entity: EventHistoryEntity) -> Self {
        Self {
            event_id: entity.event_id,
            kind: entity.kind,
            start_time_ms: (entity.start_time.unix_timestamp_nanos() / 1_000_000) as i64,
            end_time_ms: (entity.end_time.unix_timestamp_nanos() / 1_000_000) as i64,
            participants: entity.participants,
        }
    }
}
