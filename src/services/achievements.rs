use tracing::{debug, info};

use crate::dao::models::ProgressUpdate;
use crate::dto::achievements::{
    AchievementDefinition, ClaimRewardResponse, DomainEventKind, ProgressSnapshot,
    ReportDomainEventRequest, UnlockedAchievement,
};
use crate::dto::broadcast::{Broadcast, BroadcastKind};
use crate::error::ServiceError;
use crate::services::reconciler;
use crate::state::SharedState;
use crate::state::channels::TOPIC_EVENTS;
use crate::state::event::{EventKind, EventStatus};

/// The static achievement catalog.
pub fn catalog(state: &SharedState) -> &[AchievementDefinition] {
    &state.config().catalog
}

/// Feed a reported domain event into every achievement of its family and
/// return the ones whose completion flag flipped during this call.
///
/// Each (user, achievement) advance is a single atomic store operation, so
/// concurrent reports for the same user cannot lose progress and a threshold
/// crossing is observed by exactly one caller.
pub async fn track_event(
    state: &SharedState,
    user_id: &str,
    request: ReportDomainEventRequest,
) -> Result<Vec<UnlockedAchievement>, ServiceError> {
    let category = request.kind.category();
    let mut unlocked = Vec::new();

    for definition in catalog(state).iter().filter(|d| d.category == category) {
        let outcome = reconciler::update_progress(
            state,
            ProgressUpdate {
                user_id: user_id.to_owned(),
                achievement_id: definition.id.clone(),
                amount: request.magnitude,
                increment: true,
                requirement: definition.requirement,
            },
        )
        .await?;

        if outcome.newly_completed {
            info!(
                user_id,
                achievement_id = %definition.id,
                points = definition.points,
                "achievement unlocked"
            );
            unlocked.push(UnlockedAchievement {
                definition: definition.clone(),
                progress: outcome.entity.progress,
            });
        }
    }

    publish_sub_event(state, request.kind, user_id, request.magnitude).await;

    debug!(user_id, kind = ?request.kind, magnitude = request.magnitude, "domain event tracked");
    Ok(unlocked)
}

/// Surface gameplay reports as sub-events on the events topic while a
/// matching event is running: chest pickups during a treasure hunt, course
/// progress during a race. Outside one they are progress only.
async fn publish_sub_event(state: &SharedState, kind: DomainEventKind, user_id: &str, count: u64) {
    let (event_kind, broadcast_kind) = match kind {
        DomainEventKind::ChestsCollected => {
            (EventKind::TreasureHunt, BroadcastKind::ChestCollected)
        }
        DomainEventKind::DistanceWalked => (EventKind::Race, BroadcastKind::CheckpointPassed),
        _ => return,
    };

    let current = state.current_event().read().await;
    let Some(record) = current
        .as_ref()
        .filter(|r| r.kind == event_kind && r.status == EventStatus::Active)
    else {
        return;
    };
    state.channels().send(
        TOPIC_EVENTS,
        Broadcast::new(
            broadcast_kind,
            record.id.clone(),
            serde_json::json!({"user_id": user_id, "count": count}),
        ),
    );
}

/// A user's progress rows, in catalog order.
pub async fn user_progress(
    state: &SharedState,
    user_id: &str,
) -> Result<Vec<ProgressSnapshot>, ServiceError> {
    let rows = reconciler::load_progress(state, user_id).await?;

    let mut snapshots: Vec<ProgressSnapshot> = Vec::with_capacity(rows.len());
    for definition in catalog(state) {
        if let Some(row) = rows.iter().find(|r| r.achievement_id == definition.id) {
            snapshots.push(row.clone().into());
        }
    }
    Ok(snapshots)
}

/// Grant the reward for a completed achievement.
///
/// Claiming is idempotent at the store: only the call that flips the
/// `claimed` flag gets the reward, every later attempt is rejected.
pub async fn claim_reward(
    state: &SharedState,
    user_id: &str,
    achievement_id: &str,
) -> Result<ClaimRewardResponse, ServiceError> {
    let Some(definition) = catalog(state).iter().find(|d| d.id == achievement_id) else {
        return Err(ServiceError::NotFound(format!(
            "achievement `{achievement_id}` is not in the catalog"
        )));
    };

    let progress = reconciler::find_progress(state, user_id, achievement_id).await?;
    match progress {
        None => {
            return Err(ServiceError::NotFound(format!(
                "no progress recorded for `{achievement_id}`"
            )));
        }
        Some(row) if !row.completed => {
            return Err(ServiceError::InvalidState(format!(
                "achievement `{achievement_id}` is not completed"
            )));
        }
        Some(_) => {}
    }

    if !reconciler::claim(state, user_id, achievement_id).await? {
        return Err(ServiceError::AlreadyClaimed(achievement_id.to_owned()));
    }

    info!(user_id, achievement_id, reward = ?definition.reward, "reward granted");
    Ok(ClaimRewardResponse {
        achievement_id: achievement_id.to_owned(),
        reward: definition.reward.clone(),
    })
}
