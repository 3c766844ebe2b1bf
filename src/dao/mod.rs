//! Persistence layer: storage abstraction, entities, the in-process fallback
//! store, and the MongoDB backend.

/// In-process fallback store used while the remote backend is unavailable.
pub mod local;
/// Database model definitions.
pub mod models;
#[cfg(feature = "mongo-store")]
/// MongoDB-backed store implementation.
pub mod mongodb;
/// Storage abstraction layer for database operations.
pub mod storage;

use futures::future::BoxFuture;

use crate::dao::models::{
    EventHistoryEntity, ProgressEntity, ProgressOutcome, ProgressUpdate, ScoreEntity,
};
use crate::dao::storage::StorageResult;

/// Most-recent finished events retained by [`SyncStore::push_history`].
pub const HISTORY_LIMIT: usize = 50;

/// Remote collection holding score submissions.
pub const SCORES_COLLECTION: &str = "event_scores";
/// Remote collection holding per-user achievement progress.
pub const PROGRESS_COLLECTION: &str = "achievement_progress";
/// Remote collection holding the bounded recent-event window.
pub const HISTORY_COLLECTION: &str = "event_history";

/// Abstraction over the persistence layer for scores, achievement progress,
/// and recent event history.
///
/// `increment_progress` is the single write path for progress and must be
/// atomic per (user, achievement): concurrent callers may interleave but no
/// update is lost and `newly_completed` fires exactly once.
pub trait SyncStore: Send + Sync {
    /// Append a score submission; prior submissions are never overwritten.
    fn append_score(&self, score: ScoreEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load every submission recorded for an event.
    fn load_scores(&self, event_id: &str) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>>;
    /// Atomically apply a progress mutation, upserting the record.
    fn increment_progress(
        &self,
        update: ProgressUpdate,
    ) -> BoxFuture<'static, StorageResult<ProgressOutcome>>;
    /// Load every progress record for a user.
    fn load_progress(&self, user_id: &str)
    -> BoxFuture<'static, StorageResult<Vec<ProgressEntity>>>;
    /// Load a single (user, achievement) progress record.
    fn find_progress(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>>;
    /// Flip `claimed` to true if and only if the record is completed and not
    /// yet claimed; returns whether this call performed the flip.
    fn claim(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Record a finished event, keeping at most [`HISTORY_LIMIT`] entries,
    /// newest first.
    fn push_history(&self, record: EventHistoryEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Most recent finished events, newest first.
    fn load_history(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<EventHistoryEntity>>>;
    /// Cheap existence probe for a collection. Callers deduplicate these
    /// through the availability guard so at most one runs per name.
    fn collection_exists(&self, collection: &str) -> BoxFuture<'static, StorageResult<bool>>;
    /// Cheap reachability check used by the storage supervisor.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
