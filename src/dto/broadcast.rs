use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::state::event::EventId;

/// Message kinds carried on the events topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    /// An event entered its countdown window.
    EventStart,
    /// An event changed status or data mid-flight.
    EventUpdate,
    /// An event finished; payload carries a leaderboard snapshot.
    EventEnd,
    /// Treasure-hunt sub-event: a chest was collected.
    ChestCollected,
    /// Race sub-event: a checkpoint was passed.
    CheckpointPassed,
}

impl BroadcastKind {
    /// Wire name, used as the SSE event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastKind::EventStart => "event_start",
            BroadcastKind::EventUpdate => "event_update",
            BroadcastKind::EventEnd => "event_end",
            BroadcastKind::ChestCollected => "chest_collected",
            BroadcastKind::CheckpointPassed => "checkpoint_passed",
        }
    }
}

/// JSON-serializable message fanned out on a broadcast topic.
///
/// Delivery is best-effort and unordered across publishers; nothing should
/// rebuild authoritative state from replaying these.
#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Broadcast {
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: BroadcastKind,
    /// Event this message concerns.
    #[schema(value_type = String)]
    pub event_id: EventId,
    /// Kind-specific payload.
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    /// Publication instant, unix milliseconds.
    #[serde_as(as = "serde_with::TimestampMilliSeconds<i64>")]
    #[schema(value_type = i64)]
    pub timestamp: OffsetDateTime,
}

impl Broadcast {
    /// Build a message stamped with the current wall clock.
    pub fn new(kind: BroadcastKind, event_id: EventId, payload: serde_json::Value) -> Self {
        Self {
            kind,
            event_id,
            payload,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}
