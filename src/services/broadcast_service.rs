use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::dto::broadcast::Broadcast;
use crate::error::ServiceError;
use crate::state::SharedState;
use crate::state::channels::{TOPIC_CHAT, TOPIC_EVENTS, TOPIC_PRESENCE};

/// Topics clients may subscribe to over SSE.
const KNOWN_TOPICS: &[&str] = &[TOPIC_EVENTS, TOPIC_PRESENCE, TOPIC_CHAT];

/// Subscribe to a named topic, rejecting topics the hub does not carry.
pub fn subscribe(
    state: &SharedState,
    topic: &str,
) -> Result<broadcast::Receiver<Broadcast>, ServiceError> {
    if !KNOWN_TOPICS.contains(&topic) {
        return Err(ServiceError::NotFound(format!("unknown topic `{topic}`")));
    }
    Ok(state.channels().subscribe(topic))
}

/// Convert a topic receiver into an SSE response, forwarding messages until
/// the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<Broadcast>,
    topic: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from the topic and pushes into the mpsc
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(message) => {
                            let Ok(data) = serde_json::to_string(&message) else {
                                continue;
                            };
                            let event = Event::default().event(message.kind.as_str()).data(data);
                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // At-most-once delivery: drop what we missed and
                            // keep the stream alive.
                            debug!(topic, skipped, "subscriber lagged; skipping messages");
                            continue;
                        }
                    }
                }
            }
        }
        info!(topic, "live stream disconnected");
    });

    // response stream reads from the mpsc; axum drops it on disconnect
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dto::broadcast::BroadcastKind;
    use crate::state::AppState;

    #[test]
    fn unknown_topics_are_rejected() {
        let state = AppState::new(AppConfig::default());
        assert!(subscribe(&state, "events").is_ok());
        assert!(matches!(
            subscribe(&state, "gossip"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn subscription_sees_later_publishes() {
        let state = AppState::new(AppConfig::default());
        let mut rx = subscribe(&state, TOPIC_EVENTS).unwrap();

        state.channels().send(
            TOPIC_EVENTS,
            Broadcast::new(
                BroadcastKind::EventStart,
                "1700000000000-abc123".to_owned().into(),
                serde_json::json!({"kind": "coin_rush"}),
            ),
        );

        let message = rx.recv().await.unwrap();
        assert_eq!(message.kind, BroadcastKind::EventStart);
        assert_eq!(message.kind.as_str(), "event_start");
    }

    #[tokio::test]
    async fn without_a_transport_streams_stay_silent() {
        let state = AppState::new_without_transport(AppConfig::default());
        let mut rx = subscribe(&state, TOPIC_EVENTS).unwrap();

        state.channels().send(
            TOPIC_EVENTS,
            Broadcast::new(
                BroadcastKind::EventEnd,
                "1700000000000-abc123".to_owned().into(),
                serde_json::json!({}),
            ),
        );

        assert!(rx.try_recv().is_err());
    }
}
