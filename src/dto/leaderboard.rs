use serde::Serialize;
use utoipa::ToSchema;

/// One ranked leaderboard row. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// Dense 1-based rank.
    pub rank: u32,
    /// Ranked user.
    pub user_id: String,
    /// Display name captured at submission time.
    pub username: String,
    /// The user's best score for the event.
    pub score: u64,
    /// Completion time backing the score, when the event is timed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
}
