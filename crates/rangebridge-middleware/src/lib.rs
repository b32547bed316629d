//! `rangebridge-middleware` – the publishing side of the bridge.
//!
//! Routes messages between device wrappers and external clients without
//! caring about the data's meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, topic-based publish/subscribe event bus built on
//!   Tokio broadcast channels.
//! - [`transport`] – the [`Transport`] trait wrappers publish through, and
//!   [`Node`], the process-scoped transport backed by the bus.
//! - [`stream_server`] – WebSocket server that streams selected topics to
//!   external clients as JSON.

pub mod bus;
pub mod stream_server;
pub mod transport;

pub use bus::{EventBus, TopicReceiver};
pub use stream_server::ScanStreamServer;
pub use transport::{Node, Transport};
