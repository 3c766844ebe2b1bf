use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dao::models::ProgressEntity;

/// Achievement families, each fed by one kind of domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    /// Coin and chest collection totals.
    Collector,
    /// Distance walked around town.
    Explorer,
    /// Races won.
    Racer,
    /// Tricks performed.
    Performer,
    /// NPCs talked to.
    Social,
    /// Trades completed.
    Trader,
}

/// Reward tiers, bronze through platinum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AchievementTier {
    /// Entry tier.
    Bronze,
    /// Mid tier.
    Silver,
    /// High tier.
    Gold,
    /// Top tier.
    Platinum,
}

/// What completing an achievement grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RewardDescriptor {
    /// Currency credit.
    Coins {
        /// Amount credited.
        amount: u64,
    },
    /// Cosmetic skin grant.
    Skin {
        /// Inventory identifier of the skin.
        id: String,
    },
    /// Profile title grant.
    Title {
        /// Identifier of the title.
        id: String,
    },
}

/// Static catalog entry; loaded once at startup and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AchievementDefinition {
    /// Catalog identifier, e.g. `collector_1`.
    pub id: String,
    /// Family the achievement belongs to.
    pub category: AchievementCategory,
    /// Reward tier.
    pub tier: AchievementTier,
    /// Progress threshold that completes the achievement.
    pub requirement: u64,
    /// Achievement points awarded on completion.
    pub points: u32,
    /// Reward granted on claim.
    pub reward: RewardDescriptor,
}

/// Domain events gameplay reports to the progression layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DomainEventKind {
    /// Coins picked up; magnitude is the coin count.
    CoinsCollected,
    /// Chests opened during treasure hunts.
    ChestsCollected,
    /// Distance walked, in meters.
    DistanceWalked,
    /// A race was won; magnitude is usually 1.
    RaceWon,
    /// A trick was performed.
    TrickPerformed,
    /// An NPC conversation finished.
    NpcTalked,
    /// A trade with another player completed.
    TradeCompleted,
}

impl DomainEventKind {
    /// The achievement family this event advances.
    pub fn category(&self) -> AchievementCategory {
        match self {
            DomainEventKind::CoinsCollected | DomainEventKind::ChestsCollected => {
                AchievementCategory::Collector
            }
            DomainEventKind::DistanceWalked => AchievementCategory::Explorer,
            DomainEventKind::RaceWon => AchievementCategory::Racer,
            DomainEventKind::TrickPerformed => AchievementCategory::Performer,
            DomainEventKind::NpcTalked => AchievementCategory::Social,
            DomainEventKind::TradeCompleted => AchievementCategory::Trader,
        }
    }
}

/// Body for reporting a domain event.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReportDomainEventRequest {
    /// What happened.
    pub kind: DomainEventKind,
    /// How much of it happened.
    #[validate(range(min = 1))]
    pub magnitude: u64,
}

/// Per-user progress row for the progression UI.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProgressSnapshot {
    /// Achievement from the catalog.
    pub achievement_id: String,
    /// Accumulated progress.
    pub progress: u64,
    /// Whether the threshold has been reached.
    pub completed: bool,
    /// Completion instant, unix milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<i64>,
    /// Whether the reward has been granted.
    pub claimed: bool,
}

impl From<ProgressEntity> for ProgressSnapshot {
    fn from(entity: ProgressEntity) -> Self {
        Self {
            achievement_id: entity.achievement_id,
            progress: entity.progress,
            completed: entity.completed,
            completed_at_ms: entity
                .completed_at
                .map(|at| (at.unix_timestamp_nanos() / 1_000_000) as i64),
            claimed: entity.claimed,
        }
    }
}

/// An achievement whose `completed` flag flipped during this call, paired
/// with its reward for the caller to present and later claim.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UnlockedAchievement {
    /// The completed definition.
    pub definition: AchievementDefinition,
    /// Progress at unlock time.
    pub progress: u64,
}

/// Response to a claim: the reward that was granted.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimRewardResponse {
    /// Claimed achievement.
    pub achievement_id: String,
    /// Granted reward.
    pub reward: RewardDescriptor,
}
