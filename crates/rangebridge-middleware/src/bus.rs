//! Headless, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  Topics are plain strings (`"laser_topic"`,
//! `"laser_topic/status"`, …) and their channels are created lazily on first
//! use.
//!
//! Publishing never needs a running Tokio runtime, so the sampling thread of
//! a wrapper can publish directly.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use rangebridge_types::{BridgeError, Event};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    capacity: usize,
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Event>>>>,
}

impl EventBus {
    /// Create a new bus with the given per-topic channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero, like [`broadcast::channel`].
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be non-zero");
        Self {
            capacity,
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish `event` on `topic`.
    ///
    /// Returns the number of subscribers that were handed the event.
    /// `Ok(0)` means nobody is listening on the topic, which is a normal
    /// condition for a fire-and-forget publisher.
    pub fn publish(&self, topic: &str, event: Event) -> Result<usize, BridgeError> {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = topics.get(topic) else {
            return Ok(0);
        };
        match sender.send(event) {
            Ok(n) => Ok(n),
            // Every receiver has been dropped since the channel was created.
            Err(broadcast::error::SendError(_)) => Ok(0),
        }
    }

    /// Subscribe to `topic`, creating its channel if needed.
    pub fn subscribe(&self, topic: &str) -> TopicReceiver {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        TopicReceiver {
            topic: topic.to_string(),
            receiver: sender.subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Names of every topic that has been subscribed to, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single topic.
///
/// Obtained via [`EventBus::subscribe`].
#[derive(Debug)]
pub struct TopicReceiver {
    topic: String,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The topic this receiver is bound to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangebridge_types::{DeviceStatus, EventPayload, LaserScan};

    fn make_event(source: &str) -> Event {
        Event::new(source, EventPayload::LaserScan(LaserScan::default()))
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe("scan");

        let event = make_event("test::scan");
        assert_eq!(bus.publish("scan", event.clone())?, 1);

        let received = rx.recv().await?;
        assert_eq!(received.id, event.id);
        assert_eq!(rx.topic(), "scan");
        Ok(())
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe("scan");
        let mut rx2 = bus.subscribe("scan");

        let event = make_event("test::scan");
        assert_eq!(bus.publish("scan", event.clone())?, 2);

        assert_eq!(rx1.recv().await?.id, event.id);
        assert_eq!(rx2.recv().await?.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish("nobody", make_event("test")), Ok(0));

        // Channel exists but every receiver is gone.
        drop(bus.subscribe("gone"));
        assert_eq!(bus.publish("gone", make_event("test")), Ok(0));
    }

    #[test]
    fn topics_are_isolated() {
        let bus = EventBus::default();
        let mut scan_rx = bus.subscribe("laser_topic");
        let mut status_rx = bus.subscribe("laser_topic/status");

        let status = Event::new(
            "test",
            EventPayload::DeviceStatus {
                device: "sim".to_string(),
                status: DeviceStatus::Timeout,
            },
        );
        bus.publish("laser_topic/status", status).unwrap();

        assert!(scan_rx.try_recv().is_err());
        assert!(matches!(
            status_rx.try_recv().unwrap().payload,
            EventPayload::DeviceStatus { .. }
        ));
        assert_eq!(bus.topics(), vec!["laser_topic", "laser_topic/status"]);
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count("scan"), 0);
        let rx = bus.subscribe("scan");
        let clone = bus.clone();
        let _rx2 = clone.subscribe("scan");
        assert_eq!(bus.subscriber_count("scan"), 2);
        drop(rx);
        assert_eq!(bus.subscriber_count("scan"), 1);
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn lag_on_slow_subscriber() {
        let bus = EventBus::new(8);
        let mut slow_sub = bus.subscribe("scan");

        for _ in 0..100 {
            let _ = bus.publish("scan", make_event("flood"));
        }

        let result = slow_sub.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
