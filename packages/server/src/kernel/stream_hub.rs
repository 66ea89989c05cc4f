//! In-process broadcast hub for live updates.
//!
//! State changes publish `{eventId}` hints; the `/ws` endpoint fans them out
//! to connected consoles. No ordering, delivery, or backpressure guarantees:
//! consumers treat messages purely as a cue to refresh.

use tokio::sync::broadcast;

#[derive(Clone)]
pub struct StreamHub {
    tx: broadcast::Sender<serde_json::Value>,
}

impl StreamHub {
    /// Create a hub with default capacity (256 buffered messages).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a JSON value. No-op if no subscribers.
    pub fn publish(&self, value: serde_json::Value) {
        // Ignore send errors (no active receivers)
        let _ = self.tx.send(value);
    }

    /// Publish the standard state-change hint for an event.
    pub fn publish_event_id(&self, event_id: i64) {
        self.publish(serde_json::json!({ "eventId": event_id }));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<serde_json::Value> {
        self.tx.subscribe()
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe_roundtrip() {
        let hub = StreamHub::new();
        let mut rx = hub.subscribe();

        hub.publish_event_id(42);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, serde_json::json!({"eventId": 42}));
    }

    #[tokio::test]
    async fn test_publish_no_subscribers_is_noop() {
        let hub = StreamHub::new();
        // Should not panic
        hub.publish(serde_json::json!({"data": "dropped"}));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let hub = StreamHub::new();
        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();

        hub.publish_event_id(7);

        assert_eq!(rx1.recv().await.unwrap(), serde_json::json!({"eventId": 7}));
        assert_eq!(rx2.recv().await.unwrap(), serde_json::json!({"eventId": 7}));
    }
}
