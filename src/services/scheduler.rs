use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info, warn};

use crate::dao::models::ScoreEntity;
use crate::dto::broadcast::{Broadcast, BroadcastKind};
use crate::dto::events::{EventSnapshot, SubmitScoreRequest};
use crate::dto::leaderboard::LeaderboardEntry;
use crate::error::ServiceError;
use crate::services::{leaderboard, reconciler};
use crate::state::SharedState;
use crate::state::channels::TOPIC_EVENTS;
use crate::state::event::{EventId, EventKind, EventRecord, EventStatus};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

fn snapshot_payload(record: &EventRecord) -> Value {
    let snapshot = EventSnapshot::from_record(record, OffsetDateTime::now_utc());
    serde_json::to_value(&snapshot).unwrap_or(Value::Null)
}

fn broadcast_event(state: &SharedState, kind: BroadcastKind, event_id: EventId, payload: Value) {
    state
        .channels()
        .send(TOPIC_EVENTS, Broadcast::new(kind, event_id, payload));
}

/// Pick a random kind and stage the next event one interval out. Does not
/// broadcast: clients learn about events when they start.
pub async fn schedule_next(state: &SharedState) -> EventRecord {
    let _gate = state.schedule_gate().lock().await;
    stage_pending(state).await
}

async fn stage_pending(state: &SharedState) -> EventRecord {
    let config = state.config();
    let record = EventRecord::new(
        EventKind::random(),
        OffsetDateTime::now_utc() + config.event_interval,
        config.event_duration,
    );

    let mut pending = state.pending_event().write().await;
    // Single slot: staging always supersedes, so at most one future event
    // exists no matter how scheduling calls interleave under the gate.
    *pending = Some(record.clone());
    info!(event_id = %record.id, kind = ?record.kind, "next community event staged");
    record
}

/// Announce an event now: promote the pending record (or create a fresh one
/// of the requested kind), publish `event_start`, and schedule the countdown
/// flip to active.
pub async fn start_event(
    state: &SharedState,
    kind: Option<EventKind>,
) -> Result<EventRecord, ServiceError> {
    let _gate = state.schedule_gate().lock().await;
    start_event_staged(state, kind).await
}

async fn start_event_staged(
    state: &SharedState,
    kind: Option<EventKind>,
) -> Result<EventRecord, ServiceError> {
    let config = state.config();
    let now = OffsetDateTime::now_utc();

    let mut record = match kind {
        Some(kind) => EventRecord::new(kind, now, config.event_duration),
        None => {
            let staged = state.pending_event().write().await.take();
            staged.unwrap_or_else(|| {
                EventRecord::new(EventKind::random(), now, config.event_duration)
            })
        }
    };

    // A new announcement supersedes whatever is still running: finish it
    // properly so it reaches history and its watchers see `event_end`.
    finish_current(state, None).await?;

    // The event runs from its announcement, however early or late the
    // promotion happened.
    record.start_time = now;
    record.end_time = now + record.duration;
    record.countdown_secs = Some(config.countdown.as_secs());
    record.advance(EventStatus::Starting)?;

    {
        let mut current = state.current_event().write().await;
        *current = Some(record.clone());
    }

    info!(event_id = %record.id, kind = ?record.kind, "community event starting");
    broadcast_event(
        state,
        BroadcastKind::EventStart,
        record.id.clone(),
        snapshot_payload(&record),
    );

    // Countdown flip is a scheduled task, not a busy wait; replacing the
    // slot aborts any stale task from a superseded event.
    let task_state = state.clone();
    let event_id = record.id.clone();
    let countdown = config.countdown;
    let handle = tokio::spawn(async move {
        sleep(countdown).await;
        activate_event(&task_state, &event_id).await;
    });
    state.replace_countdown_task(Some(handle)).await;

    Ok(record)
}

/// Flip a still-starting event to active and republish. A stale call (event
/// superseded or already active) is a no-op.
async fn activate_event(state: &SharedState, event_id: &EventId) {
    let updated = {
        let mut current = state.current_event().write().await;
        match current.as_mut() {
            Some(record) if record.id == *event_id && record.status == EventStatus::Starting => {
                if let Err(err) = record.advance(EventStatus::Active) {
                    warn!(event_id = %event_id, error = %err, "countdown flip rejected");
                    return;
                }
                record.countdown_secs = None;
                Some(record.clone())
            }
            _ => None,
        }
    };

    match updated {
        Some(record) => {
            info!(event_id = %record.id, "community event active");
            broadcast_event(
                state,
                BroadcastKind::EventUpdate,
                record.id.clone(),
                snapshot_payload(&record),
            );
        }
        None => debug!(event_id = %event_id, "stale countdown ignored"),
    }
}

/// Register a user on the announced or running event.
pub async fn join_event(
    state: &SharedState,
    event_id: &str,
    user_id: String,
) -> Result<EventRecord, ServiceError> {
    let record = {
        let mut current = state.current_event().write().await;
        let Some(record) = current.as_mut() else {
            return Err(ServiceError::NotFound("no community event is running".into()));
        };
        if record.id.as_str() != event_id {
            return Err(ServiceError::NotFound(format!(
                "event `{event_id}` is not the current event"
            )));
        }
        if !record.is_joinable() {
            return Err(ServiceError::InvalidState(format!(
                "event `{event_id}` is not accepting participants"
            )));
        }
        record.join(user_id);
        record.clone()
    };

    broadcast_event(
        state,
        BroadcastKind::EventUpdate,
        record.id.clone(),
        snapshot_payload(&record),
    );
    Ok(record)
}

/// Handle a participant finishing the event: submit the final score through
/// the reconciler, finish the event locally, record it in history, and
/// publish `event_end` with a leaderboard snapshot.
pub async fn on_event_complete(
    state: &SharedState,
    event_id: &str,
    request: SubmitScoreRequest,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    // Completion times only rank timed kinds; drop them for everything else
    // so a stray client field cannot skew the tie-break.
    let timed = {
        let current = state.current_event().read().await;
        current
            .as_ref()
            .filter(|record| record.id.as_str() == event_id)
            .is_none_or(|record| record.kind.is_timed())
    };

    let score = ScoreEntity {
        event_id: event_id.to_owned(),
        user_id: request.user_id,
        username: request.username,
        score: request.score,
        time_ms: request.time_ms.filter(|_| timed),
        submitted_at: OffsetDateTime::now_utc(),
    };
    reconciler::submit_score(state, score).await?;

    finish_current(state, Some(event_id)).await?;

    leaderboard::rank(state, event_id).await
}

/// Finish the current event if it matches `only_id` (or unconditionally when
/// `None`): advance to finished, push it to history, broadcast `event_end`
/// with the computed leaderboard, and clear the slot.
async fn finish_current(
    state: &SharedState,
    only_id: Option<&str>,
) -> Result<(), ServiceError> {
    let finished = {
        let mut current = state.current_event().write().await;
        match current.take() {
            Some(mut record)
                if only_id.is_none_or(|id| record.id.as_str() == id)
                    && record.status != EventStatus::Finished =>
            {
                record.advance(EventStatus::Finished)?;
                Some(record)
            }
            other => {
                *current = other;
                None
            }
        }
    };

    let Some(record) = finished else {
        return Ok(());
    };

    info!(event_id = %record.id, "community event finished");
    if let Err(err) = reconciler::record_history(state, record.clone().into()).await {
        // Degraded history is not worth failing the completion path for.
        warn!(event_id = %record.id, error = %err, "failed to record event history");
    }

    let board = leaderboard::rank(state, record.id.as_str())
        .await
        .unwrap_or_default();
    let payload = serde_json::json!({
        "event": snapshot_payload(&record),
        "leaderboard": serde_json::to_value(&board).unwrap_or(Value::Null),
    });
    broadcast_event(state, BroadcastKind::EventEnd, record.id.clone(), payload);
    Ok(())
}

/// Snapshot of the announced or running event for HUD rendering.
pub async fn current_snapshot(state: &SharedState) -> Option<EventSnapshot> {
    let current = state.current_event().read().await;
    current
        .as_ref()
        .map(|record| EventSnapshot::from_record(record, OffsetDateTime::now_utc()))
}

/// 1 Hz driver: finalizes expired events, promotes due pending events, and
/// keeps exactly one future event staged at all times.
pub async fn run(state: SharedState) {
    let mut tick = interval(TICK_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    schedule_next(&state).await;

    loop {
        tick.tick().await;
        if let Err(err) = advance_clock(&state).await {
            warn!(error = %err, "scheduler tick failed");
        }
    }
}

async fn advance_clock(state: &SharedState) -> Result<(), ServiceError> {
    let now = OffsetDateTime::now_utc();

    let expired = {
        let current = state.current_event().read().await;
        current
            .as_ref()
            .is_some_and(|record| record.end_time <= now && record.status != EventStatus::Finished)
    };
    if expired {
        finish_current(state, None).await?;
    }

    let due = {
        let pending = state.pending_event().read().await;
        pending.as_ref().is_some_and(|record| record.start_time <= now)
    };
    if due {
        let _gate = state.schedule_gate().lock().await;
        // Re-check under the gate; another caller may have promoted it.
        let still_due = {
            let pending = state.pending_event().read().await;
            pending.as_ref().is_some_and(|record| record.start_time <= now)
        };
        if still_due {
            start_event_staged(state, None).await?;
            stage_pending(state).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::AppState;

    fn test_state() -> SharedState {
        let config = AppConfig {
            countdown: Duration::from_millis(20),
            event_duration: Duration::from_secs(60),
            event_interval: Duration::from_secs(300),
            ..AppConfig::default()
        };
        AppState::new(config)
    }

    fn score_request(user: &str, score: u64) -> SubmitScoreRequest {
        SubmitScoreRequest {
            user_id: user.to_owned(),
            username: user.to_uppercase(),
            score,
            time_ms: None,
        }
    }

    #[tokio::test]
    async fn schedule_next_keeps_a_single_pending_event() {
        let state = test_state();
        schedule_next(&state).await;
        let second = schedule_next(&state).await;

        let pending = state.pending_event().read().await;
        assert_eq!(pending.as_ref().map(|p| p.id.clone()), Some(second.id));
    }

    #[tokio::test]
    async fn start_event_promotes_pending_and_announces() {
        let state = test_state();
        let mut rx = state.channels().subscribe(TOPIC_EVENTS);

        let staged = schedule_next(&state).await;
        let started = start_event(&state, None).await.unwrap();
        assert_eq!(started.id, staged.id);
        assert_eq!(started.status, EventStatus::Starting);
        assert!(state.pending_event().read().await.is_none());

        let announcement = rx.recv().await.unwrap();
        assert_eq!(announcement.kind, BroadcastKind::EventStart);
        assert_eq!(announcement.event_id, started.id);
    }

    #[tokio::test]
    async fn countdown_flips_event_to_active() {
        let state = test_state();
        let started = start_event(&state, Some(EventKind::CoinRush)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        let current = state.current_event().read().await;
        let record = current.as_ref().unwrap();
        assert_eq!(record.id, started.id);
        assert_eq!(record.status, EventStatus::Active);
        assert!(record.countdown_secs.is_none());
    }

    #[tokio::test]
    async fn superseding_finishes_the_running_event() {
        let state = test_state();
        let mut rx = state.channels().subscribe(TOPIC_EVENTS);

        let first = start_event(&state, Some(EventKind::TreasureHunt)).await.unwrap();
        let second = start_event(&state, Some(EventKind::DanceOff)).await.unwrap();

        // The superseded event reached history rather than vanishing.
        let history = state.local_store().load_history(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event_id, first.id.to_string());

        // start(first), end(first), start(second), in publish order.
        let mut kinds = Vec::new();
        for _ in 0..3 {
            let message = rx.recv().await.unwrap();
            kinds.push((message.kind, message.event_id));
        }
        assert_eq!(kinds[0], (BroadcastKind::EventStart, first.id.clone()));
        assert_eq!(kinds[1], (BroadcastKind::EventEnd, first.id));
        assert_eq!(kinds[2], (BroadcastKind::EventStart, second.id));
    }

    #[tokio::test]
    async fn untimed_events_discard_completion_times() {
        let state = test_state();
        let started = start_event(&state, Some(EventKind::DanceOff)).await.unwrap();

        let mut request = score_request("alice", 30);
        request.time_ms = Some(45_000);
        let board = on_event_complete(&state, started.id.as_str(), request)
            .await
            .unwrap();
        assert_eq!(board[0].time_ms, None);
    }

    #[tokio::test]
    async fn timed_events_keep_completion_times() {
        let state = test_state();
        let started = start_event(&state, Some(EventKind::Race)).await.unwrap();

        let mut request = score_request("alice", 30);
        request.time_ms = Some(45_000);
        let board = on_event_complete(&state, started.id.as_str(), request)
            .await
            .unwrap();
        assert_eq!(board[0].time_ms, Some(45_000));
    }

    #[tokio::test]
    async fn superseded_event_never_fires_a_stale_flip() {
        let state = test_state();
        let first = start_event(&state, Some(EventKind::Race)).await.unwrap();
        let second = start_event(&state, Some(EventKind::DanceOff)).await.unwrap();
        assert_ne!(first.id, second.id);

        tokio::time::sleep(Duration::from_millis(100)).await;

        let current = state.current_event().read().await;
        let record = current.as_ref().unwrap();
        // Only the second event's countdown may act.
        assert_eq!(record.id, second.id);
        assert_eq!(record.status, EventStatus::Active);
    }

    #[tokio::test]
    async fn join_requires_matching_joinable_event() {
        let state = test_state();
        assert!(matches!(
            join_event(&state, "nope", "toon-1".into()).await,
            Err(ServiceError::NotFound(_))
        ));

        let started = start_event(&state, Some(EventKind::TreasureHunt)).await.unwrap();
        let joined = join_event(&state, started.id.as_str(), "toon-1".into())
            .await
            .unwrap();
        assert!(joined.participants.contains("toon-1"));
    }

    #[tokio::test]
    async fn completion_records_history_and_ranks() {
        let state = test_state();
        let started = start_event(&state, Some(EventKind::CoinRush)).await.unwrap();
        join_event(&state, started.id.as_str(), "alice".into())
            .await
            .unwrap();

        let board = on_event_complete(&state, started.id.as_str(), score_request("alice", 42))
            .await
            .unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].score, 42);

        assert!(state.current_event().read().await.is_none());
        let history = state.local_store().load_history(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event_id, started.id.to_string());
    }

    #[tokio::test]
    async fn finished_events_stay_finished() {
        let state = test_state();
        let started = start_event(&state, Some(EventKind::Race)).await.unwrap();
        on_event_complete(&state, started.id.as_str(), score_request("alice", 10))
            .await
            .unwrap();

        // A second completion for the same event only adds a submission.
        let board = on_event_complete(&state, started.id.as_str(), score_request("bob", 20))
            .await
            .unwrap();
        assert_eq!(board[0].user_id, "bob");
        assert_eq!(state.local_store().load_history(10).len(), 1);
    }
}
