//! WebSocket stream of bus traffic for external clients.
//!
//! [`ScanStreamServer`] accepts WebSocket connections and forwards every
//! event published on a fixed set of topics to each client as one JSON text
//! frame per event.  Incoming frames other than `Close` are ignored.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::{self, BoxStream, SelectAll};
use futures_util::{SinkExt, StreamExt};
use rangebridge_types::{BridgeError, Event};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, TopicReceiver};

/// WebSocket server streaming selected bus topics as JSON.
pub struct ScanStreamServer {
    bus: Arc<EventBus>,
    topics: Vec<String>,
    listener: TcpListener,
}

impl ScanStreamServer {
    /// Bind a server on `addr` that will stream `topics` from `bus`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Channel`] if the TCP listener cannot be bound.
    pub async fn bind(
        bus: Arc<EventBus>,
        topics: Vec<String>,
        addr: SocketAddr,
    ) -> Result<Self, BridgeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Channel(format!("ws bind error on {addr}: {e}")))?;
        Ok(Self {
            bus,
            topics,
            listener,
        })
    }

    /// Address the server is actually listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        self.listener
            .local_addr()
            .map_err(|e| BridgeError::Channel(e.to_string()))
    }

    /// Accept clients forever.  Each client is served on its own task.
    pub async fn serve(self) -> Result<(), BridgeError> {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, topics = ?self.topics, "scan stream server listening");
        }
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let bus = Arc::clone(&self.bus);
                    let topics = self.topics.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(bus, topics, stream, peer).await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }
}

async fn handle_client(
    bus: Arc<EventBus>,
    topics: Vec<String>,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), BridgeError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| BridgeError::Channel(format!("ws handshake from {peer}: {e}")))?;
    debug!(peer = %peer, "ws client connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut events = merge_topics(&bus, &topics);

    loop {
        tokio::select! {
            next = events.next() => {
                let Some(event) = next else { break };
                let json = serde_json::to_string(&event)
                    .map_err(|e| BridgeError::Serialization(e.to_string()))?;
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    debug!(peer = %peer, "ws client disconnected");
    Ok(())
}

// One stream over every topic; a lagging topic is logged and skipped ahead.
fn merge_topics(bus: &EventBus, topics: &[String]) -> SelectAll<BoxStream<'static, Event>> {
    stream::select_all(topics.iter().map(|topic| {
        stream::unfold(bus.subscribe(topic), |mut rx: TopicReceiver| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(RecvError::Lagged(n)) => {
                        warn!(topic = rx.topic(), lagged_by = n, "ws client lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangebridge_types::{DeviceStatus, EventPayload, Header, LaserScan};
    use std::time::Duration;
    use tokio_tungstenite::connect_async;

    fn scan_event() -> Event {
        Event::new(
            "test::laser_topic",
            EventPayload::LaserScan(LaserScan {
                header: Header {
                    frame_id: "laser_frame".to_string(),
                    ..Header::default()
                },
                ranges: vec![1.5, f32::INFINITY],
                intensities: vec![0.0, 0.0],
                ..LaserScan::default()
            }),
        )
    }

    #[tokio::test]
    async fn client_receives_scans_as_json() {
        let bus = Arc::new(EventBus::default());
        let server = ScanStreamServer::bind(
            Arc::clone(&bus),
            vec!["laser_topic".to_string()],
            "127.0.0.1:0".parse().unwrap(),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.serve());

        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        // The server subscribes after the handshake; keep publishing until the
        // subscription is live.
        let publisher_bus = Arc::clone(&bus);
        let publisher = tokio::spawn(async move {
            loop {
                let _ = publisher_bus.publish("laser_topic", scan_event());
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("ws error");
        publisher.abort();

        let text = match frame {
            Message::Text(text) => text,
            other => panic!("expected a text frame, got {other:?}"),
        };
        assert!(text.as_str().contains(r#""inf""#), "missing return must stay visible: {text}");
        let event: Event = serde_json::from_str(text.as_str()).unwrap();
        match event.payload {
            EventPayload::LaserScan(scan) => {
                assert_eq!(scan.header.frame_id, "laser_frame");
                assert_eq!(scan.ranges, vec![1.5, f32::INFINITY]);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn merged_stream_yields_events_from_every_topic() {
        let bus = EventBus::default();
        let mut merged = merge_topics(&bus, &["a".to_string(), "b".to_string()]);

        bus.publish("a", scan_event()).unwrap();
        bus.publish(
            "b",
            Event::new(
                "test",
                EventPayload::DeviceStatus {
                    device: "sim".to_string(),
                    status: DeviceStatus::OkInUse,
                },
            ),
        )
        .unwrap();

        let mut scans = 0;
        let mut statuses = 0;
        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(1), merged.next())
                .await
                .unwrap()
                .unwrap();
            match event.payload {
                EventPayload::LaserScan(_) => scans += 1,
                EventPayload::DeviceStatus { .. } => statuses += 1,
            }
        }
        assert_eq!((scans, statuses), (1, 1));
    }

    #[tokio::test]
    async fn bind_reports_address_in_use() {
        let bus = Arc::new(EventBus::default());
        let first = ScanStreamServer::bind(Arc::clone(&bus), vec![], "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = first.local_addr().unwrap();
        let second = ScanStreamServer::bind(bus, vec![], addr).await;
        assert!(matches!(second, Err(BridgeError::Channel(_))));
    }
}
