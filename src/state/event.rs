use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Opaque identifier for a community event: millisecond timestamp plus a
/// short random suffix, unique per process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Generate a fresh identifier from the current wall clock.
    pub fn generate() -> Self {
        let millis = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let suffix: u32 = rand::random::<u32>() & 0xff_ffff;
        Self(format!("{millis}-{suffix:06x}"))
    }

    /// View the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Closed set of community event kinds the scheduler can pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Chests hidden around town; most chests collected wins.
    TreasureHunt,
    /// Checkpoint race through the streets; lowest time wins.
    Race,
    /// Find-the-item list scattered across the map.
    ScavengerHunt,
    /// Timed dance floor; trick score decides the ranking.
    DanceOff,
    /// Coin shower in the plaza; most coins grabbed wins.
    CoinRush,
}

impl EventKind {
    /// Every supported kind, used for uniform random selection.
    pub const ALL: [EventKind; 5] = [
        EventKind::TreasureHunt,
        EventKind::Race,
        EventKind::ScavengerHunt,
        EventKind::DanceOff,
        EventKind::CoinRush,
    ];

    /// Pick a kind uniformly at random.
    pub fn random() -> Self {
        *Self::ALL
            .choose(&mut rand::rng())
            .expect("kind set is non-empty")
    }

    /// Whether rankings for this kind compare completion times (lower wins)
    /// in addition to scores.
    pub fn is_timed(&self) -> bool {
        matches!(self, EventKind::Race)
    }
}

/// Lifecycle status of an event. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Created by the scheduler, not yet announced.
    Scheduled,
    /// Announced to clients, countdown running.
    Starting,
    /// Countdown elapsed, participants are playing.
    Active,
    /// Wind-down window; accepted from remote broadcasts but the local
    /// scheduler skips straight to finished.
    Ending,
    /// Terminal.
    Finished,
}

/// Error returned when attempting to move an event's status backwards or
/// onto itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status transition: {from:?} -> {to:?} on event {event_id}")]
pub struct InvalidTransition {
    /// Identifier of the event that rejected the transition.
    pub event_id: EventId,
    /// Status the event was in.
    pub from: EventStatus,
    /// Status the caller asked for.
    pub to: EventStatus,
}

/// A single time-boxed community event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier.
    pub id: EventId,
    /// Which mini-activity this is.
    pub kind: EventKind,
    /// Current lifecycle status.
    pub status: EventStatus,
    /// Wall-clock start instant.
    #[serde(with = "time::serde::timestamp::milliseconds")]
    pub start_time: OffsetDateTime,
    /// Wall-clock end instant, always `start_time + duration`.
    #[serde(with = "time::serde::timestamp::milliseconds")]
    pub end_time: OffsetDateTime,
    /// Planned length of the event.
    pub duration: Duration,
    /// Users who joined. Insertion order is irrelevant.
    pub participants: HashSet<String>,
    /// Pre-start countdown shown to clients, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_secs: Option<u64>,
}

impl EventRecord {
    /// Create a scheduled event; the end instant is derived from the start
    /// and duration so the invariant holds by construction.
    pub fn new(kind: EventKind, start_time: OffsetDateTime, duration: Duration) -> Self {
        Self {
            id: EventId::generate(),
            kind,
            status: EventStatus::Scheduled,
            start_time,
            end_time: start_time + duration,
            duration,
            participants: HashSet::new(),
            countdown_secs: None,
        }
    }

    /// Move the status forward, rejecting regressions and no-ops.
    pub fn advance(&mut self, to: EventStatus) -> Result<EventStatus, InvalidTransition> {
        if to <= self.status {
            return Err(InvalidTransition {
                event_id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(self.status)
    }

    /// Register a participant. Joining twice is harmless.
    pub fn join(&mut self, user_id: impl Into<String>) {
        self.participants.insert(user_id.into());
    }

    /// Milliseconds until the event ends, zero once it is over.
    pub fn time_remaining_ms(&self, now: OffsetDateTime) -> u64 {
        let remaining = self.end_time - now;
        remaining.whole_milliseconds().max(0) as u64
    }

    /// Whether users may still join.
    pub fn is_joinable(&self) -> bool {
        matches!(self.status, EventStatus::Starting | EventStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> EventRecord {
        EventRecord::new(
            EventKind::Race,
            OffsetDateTime::now_utc(),
            Duration::from_secs(120),
        )
    }

    #[test]
    fn end_time_derived_from_duration() {
        let event = record();
        assert_eq!(event.end_time, event.start_time + event.duration);
    }

    #[test]
    fn full_lifecycle_moves_forward() {
        let mut event = record();
        assert_eq!(event.advance(EventStatus::Starting).unwrap(), EventStatus::Starting);
        assert_eq!(event.advance(EventStatus::Active).unwrap(), EventStatus::Active);
        assert_eq!(event.advance(EventStatus::Finished).unwrap(), EventStatus::Finished);
    }

    #[test]
    fn ending_is_a_legal_intermediate() {
        let mut event = record();
        event.advance(EventStatus::Starting).unwrap();
        event.advance(EventStatus::Active).unwrap();
        event.advance(EventStatus::Ending).unwrap();
        event.advance(EventStatus::Finished).unwrap();
        assert_eq!(event.status, EventStatus::Finished);
    }

    #[test]
    fn regressions_are_rejected() {
        let mut event = record();
        event.advance(EventStatus::Active).unwrap();

        let err = event.advance(EventStatus::Starting).unwrap_err();
        assert_eq!(err.from, EventStatus::Active);
        assert_eq!(err.to, EventStatus::Starting);
        // The failed call must leave the status untouched.
        assert_eq!(event.status, EventStatus::Active);
    }

    #[test]
    fn self_transition_is_rejected() {
        let mut event = record();
        event.advance(EventStatus::Active).unwrap();
        assert!(event.advance(EventStatus::Active).is_err());
    }

    #[test]
    fn join_is_idempotent() {
        let mut event = record();
        event.join("toon-1");
        event.join("toon-1");
        assert_eq!(event.participants.len(), 1);
    }

    #[test]
    fn time_remaining_clamps_to_zero() {
        let event = record();
        let after_end = event.end_time + Duration::from_secs(5);
        assert_eq!(event.time_remaining_ms(after_end), 0);
        assert!(event.time_remaining_ms(event.start_time) > 0);
    }

    #[test]
    fn event_ids_are_unique() {
        let a = EventId::generate();
        let b = EventId::generate();
        assert_ne!(a, b);
    }
}
