//! The publishing side seen by device wrappers.
//!
//! Wrappers never talk to the [`EventBus`] directly.  They hold an
//! `Arc<dyn Transport>` that supplies the clock for message timestamps and
//! accepts payloads for a named topic.  [`Node`] is the transport used by the
//! binary: one instance is created at startup and shared by handle with every
//! component that publishes.

use std::sync::Arc;

use rangebridge_types::{BridgeError, Event, EventPayload, Time};
use tracing::trace;

use crate::bus::EventBus;

/// Publish/subscribe transport as seen by a publisher.
pub trait Transport: Send + Sync {
    /// Clock reading used to stamp outgoing messages.
    fn now(&self) -> Time;

    /// Publish `payload` on `topic`, returning how many subscribers got it.
    fn publish(&self, topic: &str, payload: EventPayload) -> Result<usize, BridgeError>;
}

/// Process-scoped transport context backed by an [`EventBus`].
#[derive(Clone, Debug)]
pub struct Node {
    name: String,
    bus: Arc<EventBus>,
}

impl Node {
    /// Create a node called `name` publishing onto `bus`.
    pub fn new(name: impl Into<String>, bus: Arc<EventBus>) -> Self {
        Self {
            name: name.into(),
            bus,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bus this node publishes onto.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

impl Transport for Node {
    fn now(&self) -> Time {
        Time::now()
    }

    fn publish(&self, topic: &str, payload: EventPayload) -> Result<usize, BridgeError> {
        let event = Event::new(format!("{}::{topic}", self.name), payload);
        let delivered = self.bus.publish(topic, event)?;
        trace!(node = %self.name, topic, delivered, "published");
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangebridge_types::LaserScan;

    #[tokio::test]
    async fn node_publishes_onto_bus_with_source() {
        let bus = Arc::new(EventBus::default());
        let node = Node::new("rangebridge_node", Arc::clone(&bus));
        let mut rx = bus.subscribe("laser_topic");

        let scan = LaserScan {
            ranges: vec![1.0],
            intensities: vec![0.0],
            ..LaserScan::default()
        };
        assert_eq!(node.publish("laser_topic", EventPayload::LaserScan(scan)), Ok(1));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, "rangebridge_node::laser_topic");
        match event.payload {
            EventPayload::LaserScan(s) => assert_eq!(s.ranges, vec![1.0]),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn node_clock_advances() {
        let node = Node::new("n", Arc::new(EventBus::default()));
        let a = node.now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = node.now();
        assert!(b > a);
        assert!(a.sec > 0);
    }

    #[test]
    fn node_is_usable_as_trait_object() {
        let transport: Arc<dyn Transport> = Arc::new(Node::new("n", Arc::new(EventBus::default())));
        assert_eq!(
            transport.publish("nobody", EventPayload::LaserScan(LaserScan::default())),
            Ok(0)
        );
    }
}
