//! HTTP surface: route trees per area, composed into one router.

use axum::Router;

use crate::state::SharedState;

/// Achievement catalog, progression and claims.
pub mod achievements;
/// Swagger UI and OpenAPI document.
pub mod docs;
/// Event lifecycle and leaderboards.
pub mod events;
/// Health check.
pub mod health;
/// Live broadcast topic streams.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(events::router())
        .merge(achievements::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
