mod config;
mod connection;
mod error;
mod models;
/// MongoDB-backed store implementation.
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoSyncStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::CollectionMissing { collection } => {
                StorageError::CollectionMissing { collection }
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
