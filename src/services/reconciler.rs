use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::dao::local::LocalStore;
use crate::dao::models::{
    EventHistoryEntity, ProgressEntity, ProgressOutcome, ProgressUpdate, ScoreEntity,
};
use crate::dao::storage::{StorageError, StorageResult};
use crate::dao::{HISTORY_COLLECTION, PROGRESS_COLLECTION, SCORES_COLLECTION, SyncStore};
use crate::error::ServiceError;
use crate::state::SharedState;
use crate::state::availability::{AvailabilityGuard, ProbeStatus};

/// Write through the remote store when the collection is available, falling
/// back to the local store only when the collection is known (or just
/// discovered) to be missing, or when no remote store is installed at all.
///
/// Transient remote failures are surfaced to the caller instead of being
/// swallowed into the local store: data that should retry later must not be
/// silently forked.
async fn write_remote_or_local<T, R, L>(
    state: &SharedState,
    collection: &'static str,
    remote: R,
    local: L,
) -> Result<T, ServiceError>
where
    R: FnOnce(Arc<dyn SyncStore>) -> BoxFuture<'static, StorageResult<T>>,
    L: FnOnce(&LocalStore) -> T,
{
    if state.guard().is_available(collection) {
        if let Some(store) = state.remote_store().await {
            match remote(store).await {
                Ok(value) => return Ok(value),
                Err(err) if AvailabilityGuard::is_missing_error(&err) => {
                    state.guard().mark_missing(collection);
                }
                Err(err) => {
                    warn!(collection, error = %err, "remote write failed; surfacing to caller");
                    return Err(ServiceError::Unavailable(err));
                }
            }
        } else {
            debug!(collection, "no remote store installed; writing locally");
        }
    }
    Ok(local(state.local_store()))
}

/// Read path used by the aggregator and progression UI: consults the guard,
/// deduplicating concurrent existence probes so at most one real probe per
/// collection is in flight.
async fn read_remote_or_local<T, R, L>(
    state: &SharedState,
    collection: &'static str,
    remote: R,
    local: L,
) -> Result<T, ServiceError>
where
    R: FnOnce(Arc<dyn SyncStore>) -> BoxFuture<'static, StorageResult<T>>,
    L: FnOnce(&LocalStore) -> T,
{
    let Some(store) = state.remote_store().await else {
        return Ok(local(state.local_store()));
    };

    if !collection_reachable(state, collection, store.as_ref()).await {
        return Ok(local(state.local_store()));
    }

    match remote(store).await {
        Ok(value) => Ok(value),
        Err(err) if AvailabilityGuard::is_missing_error(&err) => {
            state.guard().mark_missing(collection);
            Ok(local(state.local_store()))
        }
        Err(err) => {
            warn!(collection, error = %err, "remote read failed; surfacing to caller");
            Err(ServiceError::Unavailable(err))
        }
    }
}

/// Resolve collection availability through the guard, sharing one probe
/// among concurrent callers. Unknown outcomes (abandoned probe, transient
/// probe failure) lean optimistic; the operation itself will classify.
async fn collection_reachable(
    state: &SharedState,
    collection: &'static str,
    store: &dyn SyncStore,
) -> bool {
    match state.guard().start_check(collection) {
        ProbeStatus::Missing => false,
        ProbeStatus::Pending(mut handle) => match handle.wait_for(|o| o.is_some()).await {
            Ok(outcome) => (*outcome).unwrap_or(true),
            Err(_) => true,
        },
        ProbeStatus::Probe(ticket) => match store.collection_exists(collection).await {
            Ok(exists) => {
                ticket.resolve(exists);
                exists
            }
            Err(err) => {
                debug!(collection, error = %err, "existence probe failed; assuming reachable");
                drop(ticket);
                true
            }
        },
    }
}

/// Append a score submission, remotely when possible.
pub async fn submit_score(state: &SharedState, score: ScoreEntity) -> Result<(), ServiceError> {
    let event_id = score.event_id.clone();
    let local_score = score.clone();
    write_remote_or_local(
        state,
        SCORES_COLLECTION,
        move |store| store.append_score(score),
        move |local| local.append_score(local_score),
    )
    .await?;
    debug!(event_id, "score submission recorded");
    Ok(())
}

/// All submissions for an event, read through the availability guard.
pub async fn load_scores(
    state: &SharedState,
    event_id: &str,
) -> Result<Vec<ScoreEntity>, ServiceError> {
    let id_for_remote = event_id.to_owned();
    let id_for_local = event_id.to_owned();
    read_remote_or_local(
        state,
        SCORES_COLLECTION,
        move |store| store.load_scores(&id_for_remote),
        move |local| local.load_scores(&id_for_local),
    )
    .await
}

/// Atomically advance a (user, achievement) record through whichever store
/// is reachable.
pub async fn update_progress(
    state: &SharedState,
    update: ProgressUpdate,
) -> Result<ProgressOutcome, ServiceError> {
    let local_update = update.clone();
    write_remote_or_local(
        state,
        PROGRESS_COLLECTION,
        move |store| store.increment_progress(update),
        move |local| local.increment_progress(local_update),
    )
    .await
}

/// Every progress record for a user.
pub async fn load_progress(
    state: &SharedState,
    user_id: &str,
) -> Result<Vec<ProgressEntity>, ServiceError> {
    let id_for_remote = user_id.to_owned();
    let id_for_local = user_id.to_owned();
    read_remote_or_local(
        state,
        PROGRESS_COLLECTION,
        move |store| store.load_progress(&id_for_remote),
        move |local| local.load_progress(&id_for_local),
    )
    .await
}

/// A single (user, achievement) record.
pub async fn find_progress(
    state: &SharedState,
    user_id: &str,
    achievement_id: &str,
) -> Result<Option<ProgressEntity>, ServiceError> {
    let remote_ids = (user_id.to_owned(), achievement_id.to_owned());
    let local_ids = remote_ids.clone();
    read_remote_or_local(
        state,
        PROGRESS_COLLECTION,
        move |store| store.find_progress(&remote_ids.0, &remote_ids.1),
        move |local| local.find_progress(&local_ids.0, &local_ids.1),
    )
    .await
}

/// Flip the claimed flag; true when this call performed the flip.
pub async fn claim(
    state: &SharedState,
    user_id: &str,
    achievement_id: &str,
) -> Result<bool, ServiceError> {
    let remote_ids = (user_id.to_owned(), achievement_id.to_owned());
    let local_ids = remote_ids.clone();
    write_remote_or_local(
        state,
        PROGRESS_COLLECTION,
        move |store| store.claim(&remote_ids.0, &remote_ids.1),
        move |local| local.claim(&local_ids.0, &local_ids.1),
    )
    .await
}

/// Record a finished event in the bounded history window.
pub async fn record_history(
    state: &SharedState,
    record: EventHistoryEntity,
) -> Result<(), ServiceError> {
    let local_record = record.clone();
    write_remote_or_local(
        state,
        HISTORY_COLLECTION,
        move |store| store.push_history(record),
        move |local| local.push_history(local_record),
    )
    .await
}

/// Recent finished events, newest first.
pub async fn load_history(
    state: &SharedState,
    limit: usize,
) -> Result<Vec<EventHistoryEntity>, ServiceError> {
    read_remote_or_local(
        state,
        HISTORY_COLLECTION,
        move |store| store.load_history(limit),
        move |local| local.load_history(limit),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use time::OffsetDateTime;

    use crate::config::AppConfig;
    use crate::state::AppState;

    fn score(event_id: &str, user: &str, value: u64) -> ScoreEntity {
        ScoreEntity {
            event_id: event_id.to_owned(),
            user_id: user.to_owned(),
            username: user.to_uppercase(),
            score: value,
            time_ms: None,
            submitted_at: OffsetDateTime::now_utc(),
        }
    }

    /// Store whose collections all report themselves absent.
    struct UnmigratedStore;

    impl SyncStore for UnmigratedStore {
        fn append_score(&self, _score: ScoreEntity) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async {
                Err(StorageError::CollectionMissing {
                    collection: SCORES_COLLECTION.to_owned(),
                })
            })
        }

        fn load_scores(
            &self,
            _event_id: &str,
        ) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
            Box::pin(async {
                Err(StorageError::CollectionMissing {
                    collection: SCORES_COLLECTION.to_owned(),
                })
            })
        }

        fn increment_progress(
            &self,
            _update: ProgressUpdate,
        ) -> BoxFuture<'static, StorageResult<crate::dao::models::ProgressOutcome>> {
            Box::pin(async {
                Err(StorageError::CollectionMissing {
                    collection: PROGRESS_COLLECTION.to_owned(),
                })
            })
        }

        fn load_progress(
            &self,
            _user_id: &str,
        ) -> BoxFuture<'static, StorageResult<Vec<ProgressEntity>>> {
            Box::pin(async {
                Err(StorageError::CollectionMissing {
                    collection: PROGRESS_COLLECTION.to_owned(),
                })
            })
        }

        fn find_progress(
            &self,
            _user_id: &str,
            _achievement_id: &str,
        ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
            Box::pin(async {
                Err(StorageError::CollectionMissing {
                    collection: PROGRESS_COLLECTION.to_owned(),
                })
            })
        }

        fn claim(
            &self,
            _user_id: &str,
            _achievement_id: &str,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            Box::pin(async {
                Err(StorageError::CollectionMissing {
                    collection: PROGRESS_COLLECTION.to_owned(),
                })
            })
        }

        fn push_history(
            &self,
            _record: EventHistoryEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async {
                Err(StorageError::CollectionMissing {
                    collection: HISTORY_COLLECTION.to_owned(),
                })
            })
        }

        fn load_history(
            &self,
            _limit: usize,
        ) -> BoxFuture<'static, StorageResult<Vec<EventHistoryEntity>>> {
            Box::pin(async {
                Err(StorageError::CollectionMissing {
                    collection: HISTORY_COLLECTION.to_owned(),
                })
            })
        }

        fn collection_exists(
            &self,
            _collection: &str,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            Box::pin(async { Ok(false) })
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn transient_error() -> StorageError {
        StorageError::unavailable(
            "connection reset".to_owned(),
            std::io::Error::other("connection reset"),
        )
    }

    /// Store that is reachable but fails every operation transiently.
    struct FlakyStore;

    impl SyncStore for FlakyStore {
        fn append_score(&self, _score: ScoreEntity) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(transient_error()) })
        }

        fn load_scores(
            &self,
            _event_id: &str,
        ) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
            Box::pin(async { Err(transient_error()) })
        }

        fn increment_progress(
            &self,
            _update: ProgressUpdate,
        ) -> BoxFuture<'static, StorageResult<crate::dao::models::ProgressOutcome>> {
            Box::pin(async { Err(transient_error()) })
        }

        fn load_progress(
            &self,
            _user_id: &str,
        ) -> BoxFuture<'static, StorageResult<Vec<ProgressEntity>>> {
            Box::pin(async { Err(transient_error()) })
        }

        fn find_progress(
            &self,
            _user_id: &str,
            _achievement_id: &str,
        ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
            Box::pin(async { Err(transient_error()) })
        }

        fn claim(
            &self,
            _user_id: &str,
            _achievement_id: &str,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            Box::pin(async { Err(transient_error()) })
        }

        fn push_history(
            &self,
            _record: EventHistoryEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(transient_error()) })
        }

        fn load_history(
            &self,
            _limit: usize,
        ) -> BoxFuture<'static, StorageResult<Vec<EventHistoryEntity>>> {
            Box::pin(async { Err(transient_error()) })
        }

        fn collection_exists(
            &self,
            _collection: &str,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            Box::pin(async { Ok(true) })
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn transient_failure_surfaces_and_never_forks_locally() {
        let state = AppState::new(AppConfig::default());
        state.install_remote_store(Arc::new(FlakyStore)).await;

        let result = submit_score(&state, score("e1", "alice", 10)).await;
        assert!(matches!(result, Err(ServiceError::Unavailable(_))));

        // Nothing was written locally and the collection stays available:
        // the caller is expected to retry against the remote store.
        assert!(state.local_store().as_ref().load_scores("e1").is_empty());
        assert!(state.guard().is_available(SCORES_COLLECTION));
    }

    #[tokio::test]
    async fn no_remote_store_means_local_writes_and_reads() {
        let state = AppState::new(AppConfig::default());
        submit_score(&state, score("e1", "alice", 10)).await.unwrap();

        assert_eq!(state.local_store().as_ref().load_scores("e1").len(), 1);
        let loaded = load_scores(&state, "e1").await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn installed_store_takes_the_writes() {
        let state = AppState::new(AppConfig::default());
        let remote = Arc::new(LocalStore::new());
        state
            .install_remote_store(Arc::new(Arc::clone(&remote)))
            .await;

        submit_score(&state, score("e1", "alice", 10)).await.unwrap();

        assert_eq!(remote.as_ref().load_scores("e1").len(), 1);
        assert!(state.local_store().as_ref().load_scores("e1").is_empty());

        let loaded = load_scores(&state, "e1").await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn missing_collection_trips_the_guard_and_falls_back() {
        let state = AppState::new(AppConfig::default());
        state
            .install_remote_store(Arc::new(UnmigratedStore))
            .await;

        submit_score(&state, score("e1", "alice", 10)).await.unwrap();

        // The write landed locally and the collection is now marked missing.
        assert_eq!(state.local_store().as_ref().load_scores("e1").len(), 1);
        assert!(!state.guard().is_available(SCORES_COLLECTION));

        // Later reads never touch the remote store again.
        let loaded = load_scores(&state, "e1").await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn read_path_discovers_missing_collection() {
        let state = AppState::new(AppConfig::default());
        state.local_store().as_ref().append_score(score("e1", "alice", 7));
        state
            .install_remote_store(Arc::new(UnmigratedStore))
            .await;

        // collection_exists reports false, so the read goes local without
        // ever issuing the remote query.
        let loaded = load_scores(&state, "e1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(!state.guard().is_available(SCORES_COLLECTION));
    }
}
