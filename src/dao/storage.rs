use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend cannot be reached at all (network, auth, timeout).
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The named collection does not exist on the backend (unmigrated
    /// schema). Callers report this to the availability guard instead of
    /// retrying.
    #[error("collection `{collection}` does not exist")]
    CollectionMissing {
        /// Name of the absent collection.
        collection: String,
    },
    /// The backend rejected the operation for a reason other than
    /// reachability (validation, malformed document). Not a fallback case.
    #[error("storage operation rejected: {message}")]
    Rejected {
        /// Human-readable description of the rejection.
        message: String,
        /// Underlying backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// True when this error means the target collection is absent, as
    /// opposed to a transient failure that should be retried later.
    pub fn is_missing(&self) -> bool {
        matches!(self, StorageError::CollectionMissing { .. })
    }
}
