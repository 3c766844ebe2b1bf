use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::{Bson, DateTime, doc},
    error::Error as MongoError,
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_namespace_not_found},
    models::{MongoHistoryDocument, MongoProgressDocument, MongoScoreDocument},
};
use crate::dao::{
    HISTORY_COLLECTION, HISTORY_LIMIT, PROGRESS_COLLECTION, SCORES_COLLECTION, SyncStore,
    models::{EventHistoryEntity, ProgressEntity, ProgressOutcome, ProgressUpdate, ScoreEntity},
    storage::StorageResult,
};

/// MongoDB-backed [`SyncStore`].
#[derive(Clone)]
pub struct MongoSyncStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }
}

/// Map a driver error to either the missing-collection case or an
/// operation-specific failure.
fn classify(
    collection: &str,
    source: MongoError,
    operation: impl FnOnce(MongoError) -> MongoDaoError,
) -> MongoDaoError {
    if is_namespace_not_found(&source) {
        MongoDaoError::CollectionMissing {
            collection: collection.to_owned(),
        }
    } else {
        operation(source)
    }
}

impl MongoSyncStore {
    /// Establish a connection and ensure the sync indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let scores = database.collection::<MongoScoreDocument>(SCORES_COLLECTION);
        let score_index = mongodb::IndexModel::builder()
            .keys(doc! {"event_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("score_event_idx".to_owned()))
                    .build(),
            )
            .build();
        scores
            .create_index(score_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SCORES_COLLECTION,
                index: "event_id",
                source,
            })?;

        let progress = database.collection::<MongoProgressDocument>(PROGRESS_COLLECTION);
        let progress_index = mongodb::IndexModel::builder()
            .keys(doc! {"user_id": 1, "achievement_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("progress_user_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        progress
            .create_index(progress_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PROGRESS_COLLECTION,
                index: "user_id,achievement_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn scores(&self) -> Collection<MongoScoreDocument> {
        self.database()
            .await
            .collection::<MongoScoreDocument>(SCORES_COLLECTION)
    }

    async fn progress(&self) -> Collection<MongoProgressDocument> {
        self.database()
            .await
            .collection::<MongoProgressDocument>(PROGRESS_COLLECTION)
    }

    async fn history(&self) -> Collection<MongoHistoryDocument> {
        self.database()
            .await
            .collection::<MongoHistoryDocument>(HISTORY_COLLECTION)
    }

    async fn append_score(&self, score: ScoreEntity) -> MongoResult<()> {
        let event_id = score.event_id.clone();
        let document: MongoScoreDocument = score.into();
        self.scores()
            .await
            .insert_one(document)
            .await
            .map_err(|source| {
                classify(SCORES_COLLECTION, source, |source| {
                    MongoDaoError::AppendScore {
                        event_id: event_id.clone(),
                        source,
                    }
                })
            })?;
        Ok(())
    }

    async fn load_scores(&self, event_id: &str) -> MongoResult<Vec<ScoreEntity>> {
        let map_err = |source: MongoError| {
            classify(SCORES_COLLECTION, source, |source| {
                MongoDaoError::LoadScores {
                    event_id: event_id.to_owned(),
                    source,
                }
            })
        };

        // Natural order preserves submission order for stable tie-breaks.
        let documents: Vec<MongoScoreDocument> = self
            .scores()
            .await
            .find(doc! {"event_id": event_id})
            .await
            .map_err(map_err)?
            .try_collect()
            .await
            .map_err(map_err)?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn increment_progress(&self, update: ProgressUpdate) -> MongoResult<ProgressOutcome> {
        let collection = self.progress().await;
        let filter = doc! {
            "user_id": update.user_id.as_str(),
            "achievement_id": update.achievement_id.as_str(),
        };
        let amount = update.amount as i64;
        let on_insert = doc! {
            "completed": false,
            "completed_at": Bson::Null,
            "claimed": false,
        };
        let mutation = if update.increment {
            doc! { "$inc": {"progress": amount}, "$setOnInsert": on_insert }
        } else {
            // Absolute reports are best-value counters; $max keeps progress
            // monotone under stale submissions.
            doc! { "$max": {"progress": amount}, "$setOnInsert": on_insert }
        };

        let map_err = |source: MongoError| {
            classify(PROGRESS_COLLECTION, source, |source| {
                MongoDaoError::UpdateProgress {
                    user_id: update.user_id.clone(),
                    achievement_id: update.achievement_id.clone(),
                    source,
                }
            })
        };

        let document = collection
            .find_one_and_update(filter.clone(), mutation)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(map_err)?
            .ok_or_else(|| MongoDaoError::UpdateProgress {
                user_id: update.user_id.clone(),
                achievement_id: update.achievement_id.clone(),
                source: MongoError::custom("upsert returned no document"),
            })?;

        let mut entity: ProgressEntity = document.into();
        let mut newly_completed = false;

        if !entity.completed && entity.progress >= update.requirement {
            // Only one concurrent writer can flip `completed`; the filter on
            // `completed: false` is what makes the unlock fire exactly once.
            let now = DateTime::now();
            let mut completion_filter = filter;
            completion_filter.insert("completed", false);
            let result = collection
                .update_one(
                    completion_filter,
                    doc! {"$set": {"completed": true, "completed_at": now}},
                )
                .await
                .map_err(map_err)?;

            entity.completed = true;
            if result.modified_count == 1 {
                newly_completed = true;
                entity.completed_at = Some(
                    time::OffsetDateTime::from_unix_timestamp_nanos(
                        i128::from(now.timestamp_millis()) * 1_000_000,
                    )
                    .unwrap_or(time::OffsetDateTime::UNIX_EPOCH),
                );
            }
        }

        Ok(ProgressOutcome {
            entity,
            newly_completed,
        })
    }

    async fn load_progress(&self, user_id: &str) -> MongoResult<Vec<ProgressEntity>> {
        let map_err = |source: MongoError| {
            classify(PROGRESS_COLLECTION, source, |source| {
                MongoDaoError::LoadProgress {
                    user_id: user_id.to_owned(),
                    source,
                }
            })
        };

        let documents: Vec<MongoProgressDocument> = self
            .progress()
            .await
            .find(doc! {"user_id": user_id})
            .await
            .map_err(map_err)?
            .try_collect()
            .await
            .map_err(map_err)?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn find_progress(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> MongoResult<Option<ProgressEntity>> {
        let document = self
            .progress()
            .await
            .find_one(doc! {"user_id": user_id, "achievement_id": achievement_id})
            .await
            .map_err(|source| {
                classify(PROGRESS_COLLECTION, source, |source| {
                    MongoDaoError::LoadProgress {
                        user_id: user_id.to_owned(),
                        source,
                    }
                })
            })?;
        Ok(document.map(Into::into))
    }

    async fn claim(&self, user_id: &str, achievement_id: &str) -> MongoResult<bool> {
        let result = self
            .progress()
            .await
            .update_one(
                doc! {
                    "user_id": user_id,
                    "achievement_id": achievement_id,
                    "completed": true,
                    "claimed": false,
                },
                doc! {"$set": {"claimed": true}},
            )
            .await
            .map_err(|source| {
                classify(PROGRESS_COLLECTION, source, |source| MongoDaoError::Claim {
                    user_id: user_id.to_owned(),
                    achievement_id: achievement_id.to_owned(),
                    source,
                })
            })?;
        Ok(result.modified_count == 1)
    }

    async fn push_history(&self, record: EventHistoryEntity) -> MongoResult<()> {
        let event_id = record.event_id.clone();
        let document: MongoHistoryDocument = record.into();
        let collection = self.history().await;

        let map_err = |source: MongoError| {
            classify(HISTORY_COLLECTION, source, |source| {
                MongoDaoError::SaveHistory {
                    event_id: event_id.clone(),
                    source,
                }
            })
        };

        collection
            .replace_one(doc! {"_id": document.event_id.as_str()}, &document)
            .upsert(true)
            .await
            .map_err(map_err)?;

        // Trim everything past the retention window, oldest first.
        let excess: Vec<MongoHistoryDocument> = collection
            .find(doc! {})
            .sort(doc! {"end_time": -1})
            .skip(HISTORY_LIMIT as u64)
            .await
            .map_err(map_err)?
            .try_collect()
            .await
            .map_err(map_err)?;

        if !excess.is_empty() {
            let ids: Vec<&str> = excess.iter().map(|d| d.event_id.as_str()).collect();
            collection
                .delete_many(doc! {"_id": {"$in": ids}})
                .await
                .map_err(map_err)?;
        }

        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> MongoResult<bool> {
        let names = self
            .database()
            .await
            .list_collection_names()
            .filter(doc! {"name": collection})
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(!names.is_empty())
    }

    async fn load_history(&self, limit: usize) -> MongoResult<Vec<EventHistoryEntity>> {
        let map_err =
            |source: MongoError| classify(HISTORY_COLLECTION, source, |source| {
                MongoDaoError::LoadHistory { source }
            });

        let documents: Vec<MongoHistoryDocument> = self
            .history()
            .await
            .find(doc! {})
            .sort(doc! {"end_time": -1})
            .limit(limit.min(HISTORY_LIMIT) as i64)
            .await
            .map_err(map_err)?
            .try_collect()
            .await
            .map_err(map_err)?;

        Ok(documents.into_iter().map(Into::into).collect())
    }
}

impl SyncStore for MongoSyncStore {
    fn append_score(&self, score: ScoreEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_score(score).await.map_err(Into::into) })
    }

    fn load_scores(&self, event_id: &str) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        let store = self.clone();
        let event_id = event_id.to_owned();
        Box::pin(async move { store.load_scores(&event_id).await.map_err(Into::into) })
    }

    fn increment_progress(
        &self,
        update: ProgressUpdate,
    ) -> BoxFuture<'static, StorageResult<ProgressOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.increment_progress(update).await.map_err(Into::into) })
    }

    fn load_progress(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<Vec<ProgressEntity>>> {
        let store = self.clone();
        let user_id = user_id.to_owned();
        Box::pin(async move { store.load_progress(&user_id).await.map_err(Into::into) })
    }

    fn find_progress(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
        let store = self.clone();
        let user_id = user_id.to_owned();
        let achievement_id = achievement_id.to_owned();
        Box::pin(async move {
            store
                .find_progress(&user_id, &achievement_id)
                .await
                .map_err(Into::into)
        })
    }

    fn claim(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let user_id = user_id.to_owned();
        let achievement_id = achievement_id.to_owned();
        Box::pin(async move {
            store
                .claim(&user_id, &achievement_id)
                .await
                .map_err(Into::into)
        })
    }

    fn push_history(&self, record: EventHistoryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.push_history(record).await.map_err(Into::into) })
    }

    fn load_history(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<EventHistoryEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_history(limit).await.map_err(Into::into) })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let collection = collection.to_owned();
        Box::pin(async move {
            store
                .collection_exists(&collection)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }
}
