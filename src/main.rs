//! Town Pulse Sync binary entrypoint wiring REST, SSE, and MongoDB layers.

use std::{env, net::SocketAddr};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use town_pulse_sync::config::AppConfig;
use town_pulse_sync::routes;
use town_pulse_sync::services::{health_service, scheduler};
use town_pulse_sync::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    #[cfg(feature = "mongo-store")]
    tokio::spawn(run_storage_supervisor(app_state.clone()));

    // Event clock: finalizes expired events and keeps one staged.
    tokio::spawn(scheduler::run(app_state.clone()));
    tokio::spawn(health_service::watch_degraded(app_state.clone()));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Connect-and-supervise loop for the MongoDB store; the shared state stays
/// degraded whenever no healthy connection is installed.
#[cfg(feature = "mongo-store")]
async fn run_storage_supervisor(state: town_pulse_sync::state::SharedState) {
    use std::sync::Arc;

    use town_pulse_sync::dao::SyncStore;
    use town_pulse_sync::dao::mongodb::{MongoConfig, MongoDaoError, MongoSyncStore};
    use town_pulse_sync::dao::storage::StorageError;
    use town_pulse_sync::services::storage_supervisor;

    storage_supervisor::run(state, move || async move {
        // MONGO_URI / MONGO_DB when set, a local instance otherwise.
        let config = match MongoConfig::from_env().await {
            Ok(config) => config,
            Err(MongoDaoError::MissingEnvVar { .. }) => {
                MongoConfig::from_uri("mongodb://localhost:27017", None)
                    .await
                    .map_err(StorageError::from)?
            }
            Err(err) => return Err(StorageError::from(err)),
        };
        let store = MongoSyncStore::connect(config)
            .await
            .map_err(StorageError::from)?;
        Ok(Arc::new(store) as Arc<dyn SyncStore>)
    })
    .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: town_pulse_sync::state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
