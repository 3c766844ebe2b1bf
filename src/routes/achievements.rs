use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::achievements::{
        AchievementDefinition, ClaimRewardResponse, ProgressSnapshot, ReportDomainEventRequest,
        UnlockedAchievement,
    },
    error::AppError,
    services::achievements,
    state::SharedState,
};

/// Routes for the achievement catalog, progression, and reward claims.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/achievements", get(catalog))
        .route("/achievements/{user_id}", get(user_progress))
        .route(
            "/achievements/{user_id}/{achievement_id}/claim",
            post(claim_reward),
        )
        .route("/progress/{user_id}", post(report_event))
}

/// The static achievement catalog.
#[utoipa::path(
    get,
    path = "/achievements",
    tag = "achievements",
    responses(
        (status = 200, description = "Achievement catalog", body = [AchievementDefinition])
    )
)]
pub async fn catalog(State(state): State<SharedState>) -> Json<Vec<AchievementDefinition>> {
    Json(achievements::catalog(&state).to_vec())
}

/// A user's progress rows, in catalog order.
#[utoipa::path(
    get,
    path = "/achievements/{user_id}",
    tag = "achievements",
    params(("user_id" = String, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Progress rows", body = [ProgressSnapshot])
    )
)]
pub async fn user_progress(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ProgressSnapshot>>, AppError> {
    let rows = achievements::user_progress(&state, &user_id).await?;
    Ok(Json(rows))
}

/// Claim the reward for a completed achievement.
#[utoipa::path(
    post,
    path = "/achievements/{user_id}/{achievement_id}/claim",
    tag = "achievements",
    params(
        ("user_id" = String, Path, description = "User identifier"),
        ("achievement_id" = String, Path, description = "Catalog identifier")
    ),
    responses(
        (status = 200, description = "Reward granted", body = ClaimRewardResponse),
        (status = 404, description = "Unknown achievement or no progress"),
        (status = 409, description = "Not completed, or already claimed")
    )
)]
pub async fn claim_reward(
    State(state): State<SharedState>,
    Path((user_id, achievement_id)): Path<(String, String)>,
) -> Result<Json<ClaimRewardResponse>, AppError> {
    let granted = achievements::claim_reward(&state, &user_id, &achievement_id).await?;
    Ok(Json(granted))
}

/// Report a gameplay event and return any achievements it unlocked.
#[utoipa::path(
    post,
    path = "/progress/{user_id}",
    tag = "achievements",
    params(("user_id" = String, Path, description = "User identifier")),
    request_body = ReportDomainEventRequest,
    responses(
        (status = 200, description = "Achievements unlocked by this report", body = [UnlockedAchievement]),
        (status = 503, description = "Remote storage failed transiently")
    )
)]
pub async fn report_event(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Valid(Json(payload)): Valid<Json<ReportDomainEventRequest>>,
) -> Result<Json<Vec<UnlockedAchievement>>, AppError> {
    let unlocked = achievements::track_event(&state, &user_id, payload).await?;
    Ok(Json(unlocked))
}
