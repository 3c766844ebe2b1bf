use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use axum_valid::Valid;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    dto::events::{
        CurrentEventResponse, EventHistorySnapshot, EventSnapshot, JoinEventRequest,
        SubmitScoreRequest,
    },
    dto::leaderboard::LeaderboardEntry,
    error::AppError,
    services::{leaderboard, reconciler, scheduler},
    state::SharedState,
};

/// Routes for the community event lifecycle and leaderboards.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/events/current", get(current_event))
        .route("/events/history", get(event_history))
        .route("/events/{id}/join", post(join_event))
        .route("/events/{id}/score", post(submit_score))
        .route("/events/{id}/leaderboard", get(event_leaderboard))
}

/// The announced or running event, null between events.
#[utoipa::path(
    get,
    path = "/events/current",
    tag = "events",
    responses(
        (status = 200, description = "Current event snapshot", body = CurrentEventResponse)
    )
)]
pub async fn current_event(State(state): State<SharedState>) -> Json<CurrentEventResponse> {
    let event = scheduler::current_snapshot(&state).await;
    Json(CurrentEventResponse { event })
}

#[derive(Debug, Deserialize, IntoParams)]
/// Query options for the history endpoint.
pub struct HistoryQuery {
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
}

/// Recently finished events, newest first.
#[utoipa::path(
    get,
    path = "/events/history",
    tag = "events",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Finished events, newest first", body = [EventHistorySnapshot])
    )
)]
pub async fn event_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<EventHistorySnapshot>>, AppError> {
    let limit = query.limit.unwrap_or(crate::dao::HISTORY_LIMIT);
    let entries = reconciler::load_history(&state, limit).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// Register a participant on the current event.
#[utoipa::path(
    post,
    path = "/events/{id}/join",
    tag = "events",
    params(("id" = String, Path, description = "Event identifier")),
    request_body = JoinEventRequest,
    responses(
        (status = 200, description = "Joined", body = EventSnapshot),
        (status = 404, description = "Not the current event"),
        (status = 409, description = "Event no longer joinable")
    )
)]
pub async fn join_event(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<JoinEventRequest>>,
) -> Result<Json<EventSnapshot>, AppError> {
    let record = scheduler::join_event(&state, &id, payload.user_id).await?;
    let snapshot = EventSnapshot::from_record(&record, time::OffsetDateTime::now_utc());
    Ok(Json(snapshot))
}

/// Submit a participant's final score and return the resulting leaderboard.
#[utoipa::path(
    post,
    path = "/events/{id}/score",
    tag = "events",
    params(("id" = String, Path, description = "Event identifier")),
    request_body = SubmitScoreRequest,
    responses(
        (status = 200, description = "Leaderboard after the submission", body = [LeaderboardEntry]),
        (status = 503, description = "Remote storage failed transiently")
    )
)]
pub async fn submit_score(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<SubmitScoreRequest>>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let board = scheduler::on_event_complete(&state, &id, payload).await?;
    Ok(Json(board))
}

/// Ranked standings for an event.
#[utoipa::path(
    get,
    path = "/events/{id}/leaderboard",
    tag = "events",
    params(("id" = String, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Ranked standings", body = [LeaderboardEntry])
    )
)]
pub async fn event_leaderboard(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let board = leaderboard::rank(&state, &id).await?;
    Ok(Json(board))
}
