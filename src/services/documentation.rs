use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Town Pulse Sync.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::live_stream,
        crate::routes::events::current_event,
        crate::routes::events::event_history,
        crate::routes::events::join_event,
        crate::routes::events::submit_score,
        crate::routes::events::event_leaderboard,
        crate::routes::achievements::catalog,
        crate::routes::achievements::user_progress,
        crate::routes::achievements::claim_reward,
        crate::routes::achievements::report_event,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::events::CurrentEventResponse,
            crate::dto::events::EventSnapshot,
            crate::dto::events::EventHistorySnapshot,
            crate::dto::events::JoinEventRequest,
            crate::dto::events::SubmitScoreRequest,
            crate::dto::leaderboard::LeaderboardEntry,
            crate::dto::achievements::AchievementDefinition,
            crate::dto::achievements::AchievementCategory,
            crate::dto::achievements::AchievementTier,
            crate::dto::achievements::RewardDescriptor,
            crate::dto::achievements::DomainEventKind,
            crate::dto::achievements::ReportDomainEventRequest,
            crate::dto::achievements::ProgressSnapshot,
            crate::dto::achievements::UnlockedAchievement,
            crate::dto::achievements::ClaimRewardResponse,
            crate::dto::broadcast::Broadcast,
            crate::dto::broadcast::BroadcastKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "events", description = "Community event lifecycle and leaderboards"),
        (name = "achievements", description = "Achievement catalog, progression and claims"),
        (name = "live", description = "Server-sent events topic streams"),
    )
)]
pub struct ApiDoc;
