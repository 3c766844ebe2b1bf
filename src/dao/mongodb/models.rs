use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::dao::models::{EventHistoryEntity, ProgressEntity, ScoreEntity};
use crate::state::event::{EventKind, EventStatus};

fn to_bson_datetime(value: OffsetDateTime) -> DateTime {
    DateTime::from_millis((value.unix_timestamp_nanos() / 1_000_000) as i64)
}

fn from_bson_datetime(value: DateTime) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(value.timestamp_millis()) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoScoreDocument {
    pub event_id: String,
    pub user_id: String,
    pub username: String,
    pub score: i64,
    pub time_ms: Option<i64>,
    pub submitted_at: DateTime,
}

impl From<ScoreEntity> for MongoScoreDocument {
    fn from(value: ScoreEntity) -> Self {
        Self {
            event_id: value.event_id,
            user_id: value.user_id,
            username: value.username,
            score: value.score as i64,
            time_ms: value.time_ms.map(|t| t as i64),
            submitted_at: to_bson_datetime(value.submitted_at),
        }
    }
}

impl From<MongoScoreDocument> for ScoreEntity {
    fn from(value: MongoScoreDocument) -> Self {
        Self {
            event_id: value.event_id,
            user_id: value.user_id,
            username: value.username,
            score: value.score.max(0) as u64,
            time_ms: value.time_ms.map(|t| t.max(0) as u64),
            submitted_at: from_bson_datetime(value.submitted_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoProgressDocument {
    pub user_id: String,
    pub achievement_id: String,
    pub progress: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime>,
    pub claimed: bool,
}

impl From<MongoProgressDocument> for ProgressEntity {
    fn from(value: MongoProgressDocument) -> Self {
        Self {
            user_id: value.user_id,
            achievement_id: value.achievement_id,
            progress: value.progress.max(0) as u64,
            completed: value.completed,
            completed_at: value.completed_at.map(from_bson_datetime),
            claimed: value.claimed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoHistoryDocument {
    #[serde(rename = "_id")]
    pub event_id: String,
    pub kind: EventKind,
    pub status: EventStatus,
    pub start_time: DateTime,
    pub end_time: DateTime,
    pub participants: Vec<String>,
}

impl From<EventHistoryEntity> for MongoHistoryDocument {
    fn from(value: EventHistoryEntity) -> Self {
        Self {
            event_id: value.event_id,
            kind: value.kind,
            status: value.status,
            start_time: to_bson_datetime(value.start_time),
            end_time: to_bson_datetime(value.end_time),
            participants: value.participants,
        }
    }
}

impl From<MongoHistoryDocument> for EventHistoryEntity {
    fn from(value: MongoHistoryDocument) -> Self {
        Self {
            event_id: value.event_id,
            kind: value.kind,
            status: value.status,
            start_time: from_bson_datetime(value.start_time),
            end_time: from_bson_datetime(value.end_time),
            participants: value.participants,
        }
    }
}
