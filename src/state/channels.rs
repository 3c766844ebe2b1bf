use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::dto::broadcast::Broadcast;

/// Topic carrying event lifecycle broadcasts.
pub const TOPIC_EVENTS: &str = "events";
/// Topic carrying presence updates.
pub const TOPIC_PRESENCE: &str = "presence";
/// Topic carrying chat messages.
pub const TOPIC_CHAT: &str = "chat";

/// Named publish/subscribe hub over in-process broadcast channels.
///
/// Topics are independent: delivery order is only meaningful within a single
/// topic and a single publisher. Delivery is best-effort, at-most-once; a
/// send with no subscribers, or on a disabled hub, is silently dropped.
pub struct ChannelHub {
    topics: DashMap<String, broadcast::Sender<Broadcast>>,
    capacity: usize,
    enabled: bool,
}

impl ChannelHub {
    /// Create a hub whose per-topic channels buffer up to `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity,
            enabled: true,
        }
    }

    /// Create a hub for a process without a realtime transport: subscribers
    /// receive nothing and sends vanish, with no error either way.
    pub fn disabled(capacity: usize) -> Self {
        Self {
            enabled: false,
            ..Self::new(capacity)
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Broadcast> {
        self.topics
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Fire-and-forget publish on a topic. Lagging or absent subscribers are
    /// not an error.
    pub fn send(&self, topic: &str, message: Broadcast) {
        if !self.enabled {
            return;
        }
        let _ = self.sender(topic).send(message);
    }

    /// Register a subscriber on a topic; it receives messages published
    /// after this call. On a disabled hub the receiver simply stays silent.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Broadcast> {
        self.sender(topic).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::broadcast::BroadcastKind;

    fn message(kind: BroadcastKind) -> Broadcast {
        Broadcast::new(kind, "1700000000000-abc123".to_owned().into(), serde_json::json!({}))
    }

    #[tokio::test]
    async fn subscribers_receive_topic_messages() {
        let hub = ChannelHub::new(8);
        let mut rx = hub.subscribe(TOPIC_EVENTS);
        hub.send(TOPIC_EVENTS, message(BroadcastKind::EventStart));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, BroadcastKind::EventStart);
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let hub = ChannelHub::new(8);
        let mut chat = hub.subscribe(TOPIC_CHAT);
        hub.send(TOPIC_EVENTS, message(BroadcastKind::EventStart));
        hub.send(TOPIC_CHAT, message(BroadcastKind::EventUpdate));

        // Only the chat message arrives on the chat topic.
        let received = chat.recv().await.unwrap();
        assert_eq!(received.kind, BroadcastKind::EventUpdate);
        assert!(chat.try_recv().is_err());
    }

    #[test]
    fn send_without_subscribers_is_silent() {
        let hub = ChannelHub::new(8);
        hub.send(TOPIC_PRESENCE, message(BroadcastKind::EventEnd));
    }

    #[tokio::test]
    async fn disabled_hub_drops_everything() {
        let hub = ChannelHub::disabled(8);
        let mut rx = hub.subscribe(TOPIC_EVENTS);
        hub.send(TOPIC_EVENTS, message(BroadcastKind::EventStart));
        assert!(rx.try_recv().is_err());
    }
}
