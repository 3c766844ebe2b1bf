use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use futures::future::BoxFuture;
use time::OffsetDateTime;

use crate::dao::models::{
    EventHistoryEntity, ProgressEntity, ProgressOutcome, ProgressUpdate, ScoreEntity,
};
use crate::dao::storage::StorageResult;
use crate::dao::{HISTORY_LIMIT, SyncStore};

/// In-process fallback store.
///
/// Logical shape mirrors the remote one: `event_scores_<event_id>` lists of
/// submissions, a bounded `event_history` window, and one progress record per
/// (user, achievement). Everything the remote store cannot take while
/// degraded lands here; nothing is ever deleted except history past the
/// bound.
#[derive(Default)]
pub struct LocalStore {
    scores: DashMap<String, Vec<ScoreEntity>>,
    progress: DashMap<(String, String), ProgressEntity>,
    history: Mutex<Vec<EventHistoryEntity>>,
}

/// Apply a progress mutation to a record in place, returning whether this
/// call crossed the completion threshold.
pub(crate) fn apply_progress(entity: &mut ProgressEntity, update: &ProgressUpdate) -> bool {
    entity.progress = if update.increment {
        entity.progress.saturating_add(update.amount)
    } else {
        // Absolute mode keeps progress monotone: a smaller candidate is a
        // stale report, not a regression.
        entity.progress.max(update.amount)
    };

    let newly_completed = !entity.completed && entity.progress >= update.requirement;
    if newly_completed {
        entity.completed = true;
        entity.completed_at = Some(OffsetDateTime::now_utc());
    }
    newly_completed
}

impl LocalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a submission to the event's score list.
    pub fn append_score(&self, score: ScoreEntity) {
        self.scores
            .entry(score.event_id.clone())
            .or_default()
            .push(score);
    }

    /// All submissions recorded for an event, in submission order.
    pub fn load_scores(&self, event_id: &str) -> Vec<ScoreEntity> {
        self.scores
            .get(event_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Atomically advance a (user, achievement) record. The dashmap entry
    /// guard holds the shard lock for the whole read-modify-write, so
    /// concurrent increments cannot lose updates.
    pub fn increment_progress(&self, update: ProgressUpdate) -> ProgressOutcome {
        let key = (update.user_id.clone(), update.achievement_id.clone());
        let mut entry = self
            .progress
            .entry(key)
            .or_insert_with(|| ProgressEntity::new(&update.user_id, &update.achievement_id));

        let newly_completed = apply_progress(entry.value_mut(), &update);
        ProgressOutcome {
            entity: entry.value().clone(),
            newly_completed,
        }
    }

    /// Every progress record owned by a user.
    pub fn load_progress(&self, user_id: &str) -> Vec<ProgressEntity> {
        self.progress
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// A single (user, achievement) record, if any progress exists.
    pub fn find_progress(&self, user_id: &str, achievement_id: &str) -> Option<ProgressEntity> {
        self.progress
            .get(&(user_id.to_owned(), achievement_id.to_owned()))
            .map(|entry| entry.value().clone())
    }

    /// Flip `claimed` under the shard lock; true when this call did the flip.
    pub fn claim(&self, user_id: &str, achievement_id: &str) -> bool {
        let key = (user_id.to_owned(), achievement_id.to_owned());
        let Some(mut entry) = self.progress.get_mut(&key) else {
            return false;
        };
        let record = entry.value_mut();
        if !record.completed || record.claimed {
            return false;
        }
        record.claimed = true;
        true
    }

    /// Prepend a finished event, trimming the window to [`HISTORY_LIMIT`].
    pub fn push_history(&self, record: EventHistoryEntity) {
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        history.insert(0, record);
        history.truncate(HISTORY_LIMIT);
    }

    /// Most recent finished events, newest first.
    pub fn load_history(&self, limit: usize) -> Vec<EventHistoryEntity> {
        let history = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        history.iter().take(limit).cloned().collect()
    }
}

impl SyncStore for std::sync::Arc<LocalStore> {
    fn append_score(&self, score: ScoreEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = Self::clone(self);
        Box::pin(async move {
            store.as_ref().append_score(score);
            Ok(())
        })
    }

    fn load_scores(&self, event_id: &str) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        let store = Self::clone(self);
        let event_id = event_id.to_owned();
        Box::pin(async move { Ok(store.as_ref().load_scores(&event_id)) })
    }

    fn increment_progress(
        &self,
        update: ProgressUpdate,
    ) -> BoxFuture<'static, StorageResult<ProgressOutcome>> {
        let store = Self::clone(self);
        Box::pin(async move { Ok(store.as_ref().increment_progress(update)) })
    }

    fn load_progress(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<ProgressEntity>>> {
        let store = Self::clone(self);
        let user_id = user_id.to_owned();
        Box::pin(async move { Ok(store.as_ref().load_progress(&user_id)) })
    }

    fn find_progress(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
        let store = Self::clone(self);
        let user_id = user_id.to_owned();
        let achievement_id = achievement_id.to_owned();
        Box::pin(async move { Ok(store.as_ref().find_progress(&user_id, &achievement_id)) })
    }

    fn claim(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = Self::clone(self);
        let user_id = user_id.to_owned();
        let achievement_id = achievement_id.to_owned();
        Box::pin(async move { Ok(store.as_ref().claim(&user_id, &achievement_id)) })
    }

    fn push_history(&self, record: EventHistoryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = Self::clone(self);
        Box::pin(async move {
            store.as_ref().push_history(record);
            Ok(())
        })
    }

    fn load_history(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<EventHistoryEntity>>> {
        let store = Self::clone(self);
        Box::pin(async move { Ok(store.as_ref().load_history(limit)) })
    }

    fn collection_exists(&self, _collection: &str) -> BoxFuture<'static, StorageResult<bool>> {
        Box::pin(async { Ok(true) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::event::{EventKind, EventRecord, EventStatus};
    use std::sync::Arc;
    use std::time::Duration;

    fn score(event_id: &str, user_id: &str, value: u64) -> ScoreEntity {
        ScoreEntity {
            event_id: event_id.to_owned(),
            user_id: user_id.to_owned(),
            username: user_id.to_uppercase(),
            score: value,
            time_ms: None,
            submitted_at: OffsetDateTime::now_utc(),
        }
    }

    fn update(user: &str, achievement: &str, amount: u64, requirement: u64) -> ProgressUpdate {
        ProgressUpdate {
            user_id: user.to_owned(),
            achievement_id: achievement.to_owned(),
            amount,
            increment: true,
            requirement,
        }
    }

    #[test]
    fn scores_are_append_only() {
        let store = LocalStore::new();
        store.append_score(score("e1", "alice", 10));
        store.append_score(score("e1", "alice", 20));
        store.append_score(score("e2", "bob", 5));

        assert_eq!(store.load_scores("e1").len(), 2);
        assert_eq!(store.load_scores("e2").len(), 1);
        assert!(store.load_scores("e3").is_empty());
    }

    #[test]
    fn progress_crosses_threshold_exactly_once() {
        let store = LocalStore::new();

        let first = store.increment_progress(update("alice", "collector_1", 60, 50));
        assert!(first.newly_completed);
        assert!(first.entity.completed);
        assert_eq!(first.entity.progress, 60);

        let second = store.increment_progress(update("alice", "collector_1", 10, 50));
        assert!(!second.newly_completed);
        assert!(second.entity.completed);
        assert_eq!(second.entity.progress, 70);
    }

    #[test]
    fn absolute_updates_never_regress() {
        let store = LocalStore::new();
        let mut up = update("alice", "racer_best", 300, 1000);
        up.increment = false;
        store.increment_progress(up.clone());

        up.amount = 200;
        let outcome = store.increment_progress(up);
        assert_eq!(outcome.entity.progress, 300);
    }

    #[test]
    fn claim_requires_completion_and_happens_once() {
        let store = LocalStore::new();
        assert!(!store.claim("alice", "collector_1"));

        store.increment_progress(update("alice", "collector_1", 10, 50));
        assert!(!store.claim("alice", "collector_1"));

        store.increment_progress(update("alice", "collector_1", 50, 50));
        assert!(store.claim("alice", "collector_1"));
        assert!(!store.claim("alice", "collector_1"));
    }

    #[tokio::test]
    async fn concurrent_increments_lose_nothing() {
        let store = Arc::new(LocalStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.as_ref().increment_progress(update("alice", "walker_1", 1, 1_000))
            }));
        }
        let mut completions = 0;
        for handle in handles {
            if handle.await.unwrap().newly_completed {
                completions += 1;
            }
        }
        assert_eq!(completions, 0);
        let record = store.as_ref().find_progress("alice", "walker_1").unwrap();
        assert_eq!(record.progress, 32);
    }

    #[test]
    fn history_is_bounded_and_newest_first() {
        let store = LocalStore::new();
        let mut last_id = String::new();
        for _ in 0..(HISTORY_LIMIT + 5) {
            let record = EventRecord::new(
                EventKind::CoinRush,
                OffsetDateTime::now_utc(),
                Duration::from_secs(60),
            );
            last_id = record.id.to_string();
            store.push_history(record.into());
        }

        let history = store.load_history(usize::MAX);
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0].event_id, last_id);
        assert!(history.iter().all(|r| r.status == EventStatus::Scheduled));
    }
}
