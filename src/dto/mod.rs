//! Wire-level request, response, and broadcast message types.

/// Achievement catalog, progression, and claim payloads.
pub mod achievements;
/// Messages fanned out on broadcast topics.
pub mod broadcast;
/// Event lifecycle snapshots and submissions.
pub mod events;
/// Health check payload.
pub mod health;
/// Ranked leaderboard entries.
pub mod leaderboard;
