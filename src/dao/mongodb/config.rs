use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

/// Parsed connection settings for the MongoDB store.
#[derive(Clone)]
pub struct MongoConfig {
    /// Driver client options parsed from the URI.
    pub options: ClientOptions,
    /// Database holding the sync collections.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse a connection URI, defaulting the database name when absent.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or("town_pulse").to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
        })
    }

    /// Build the configuration from `MONGO_URI` / `MONGO_DB`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB").ok();
        Self::from_uri(&uri, db.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_uri_defaults_the_database_name() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", None)
            .await
            .unwrap();
        assert_eq!(config.database_name, "town_pulse");
    }

    #[tokio::test]
    async fn from_uri_honors_an_explicit_database() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", Some("pulse_test"))
            .await
            .unwrap();
        assert_eq!(config.database_name, "pulse_test");
    }

    #[tokio::test]
    async fn from_uri_rejects_garbage() {
        let result = MongoConfig::from_uri("not a uri", None).await;
        assert!(matches!(result, Err(MongoDaoError::InvalidUri { .. })));
    }
}
