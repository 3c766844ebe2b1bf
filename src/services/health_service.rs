use tracing::{info, warn};

use crate::{dto::health::HealthResponse, state::SharedState};

/// Follow degraded-mode transitions for the life of the process, logging
/// each one. Ends when the state is dropped.
pub async fn watch_degraded(state: SharedState) {
    let mut watcher = state.degraded_watcher();
    // Hold only the receiver so the loop ends once the state is gone.
    drop(state);
    loop {
        if *watcher.borrow_and_update() {
            warn!("running on local fallback storage");
        } else {
            info!("remote storage active");
        }
        if watcher.changed().await.is_err() {
            break;
        }
    }
}

/// Respond with a health payload while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.remote_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        None => warn!("remote storage unavailable (degraded mode)"),
    }

    if state.is_degraded().await {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}
