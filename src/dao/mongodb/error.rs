use mongodb::error::{Error as MongoError, ErrorKind};
use thiserror::Error;

/// Result alias for the MongoDB dao layer.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Errors raised by the MongoDB-backed store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Connection URI failed to parse.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Required environment variable is absent.
    #[error("missing environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// Client could not be built from the parsed options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Initial ping never succeeded.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Ping attempts made before giving up.
        attempts: u32,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Periodic health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Target collection.
        collection: &'static str,
        /// Index description.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server reported the target collection as absent.
    #[error("collection `{collection}` does not exist on the server")]
    CollectionMissing {
        /// Absent collection name.
        collection: String,
    },
    /// Score insertion failed.
    #[error("failed to append score for event `{event_id}`")]
    AppendScore {
        /// Target event.
        event_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Score query failed.
    #[error("failed to load scores for event `{event_id}`")]
    LoadScores {
        /// Target event.
        event_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Atomic progress upsert failed.
    #[error("failed to update progress `{achievement_id}` for user `{user_id}`")]
    UpdateProgress {
        /// Owning user.
        user_id: String,
        /// Target achievement.
        achievement_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Progress query failed.
    #[error("failed to load progress for user `{user_id}`")]
    LoadProgress {
        /// Owning user.
        user_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Claim update failed.
    #[error("failed to claim `{achievement_id}` for user `{user_id}`")]
    Claim {
        /// Owning user.
        user_id: String,
        /// Target achievement.
        achievement_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// History write failed.
    #[error("failed to record event `{event_id}` in history")]
    SaveHistory {
        /// Finished event.
        event_id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// History query failed.
    #[error("failed to load event history")]
    LoadHistory {
        /// Driver error.
        #[source]
        source: MongoError,
    },
}

/// MongoDB code for `NamespaceNotFound`.
const NAMESPACE_NOT_FOUND: i32 = 26;

/// Whether the driver error means the target namespace (collection) does not
/// exist, as opposed to any reachability or validation failure.
pub fn is_namespace_not_found(err: &MongoError) -> bool {
    match &*err.kind {
        ErrorKind::Command(command) => {
            command.code == NAMESPACE_NOT_FOUND || command.message.contains("ns not found")
        }
        _ => false,
    }
}
