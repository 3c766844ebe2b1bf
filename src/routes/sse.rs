use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{error::AppError, services::broadcast_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/live/{topic}",
    tag = "live",
    params(("topic" = String, Path, description = "Topic name: events, presence or chat")),
    responses(
        (status = 200, description = "Live topic stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown topic")
    )
)]
/// Stream a broadcast topic to a connected client.
pub async fn live_stream(
    State(state): State<SharedState>,
    Path(topic): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let receiver = broadcast_service::subscribe(&state, &topic)?;
    info!(topic, "new live stream connection");
    Ok(broadcast_service::to_sse_stream(receiver, topic))
}

/// Configure the live stream endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/live/{topic}", get(live_stream))
}
