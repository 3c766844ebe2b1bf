/// Achievement tracking and reward claims.
pub mod achievements;
/// Topic subscriptions bridged onto SSE responses.
pub mod broadcast_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Leaderboard aggregation and ranking.
pub mod leaderboard;
/// Remote-or-local persistence reconciliation.
pub mod reconciler;
/// Community event scheduling state machine.
pub mod scheduler;
/// Remote storage connection supervisor.
pub mod storage_supervisor;
