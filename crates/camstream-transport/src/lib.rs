//! Outbound frame channel.
//!
//! A [`TransportChannel`] owns one duplex connection to the receiving
//! endpoint. Frames go out as one binary message each through a cloneable
//! [`ChannelSender`]; anything sent while the channel is not open is dropped.

mod channel;
mod connection;
mod error;
mod websocket;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use camstream_ipc::ChannelState;
pub use channel::{
    ChannelSender, DropReason, InboundMessage, SendOutcome, TransportChannel, TransportStatistics,
};
pub use connection::{transition, ChannelConfig, ChannelEvent};
pub use error::TransportError;
pub use websocket::WebSocketConnector;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

/// Frames waiting for the link. One slot: a busy link drops, never queues.
pub const OUTBOUND_SLOT_CAPACITY: usize = 1;

/// Channel capacity for messages received from the endpoint.
pub const INBOUND_CHANNEL_CAPACITY: usize = 32;

/// Default upper bound on a connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `close` waits for the connection task to wind down.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// A message received over a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMessage {
    Text(String),
    Binary(Bytes),
}

/// Opens links to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a link. Resolves when the endpoint accepted it.
    async fn connect(&self, endpoint: &Url) -> TransportResult<Box<dyn Link>>;

    /// Get connector name for diagnostics.
    fn name(&self) -> &'static str;
}

/// An established message-oriented link.
#[async_trait]
pub trait Link: Send {
    /// Write one binary message.
    async fn send(&mut self, payload: Bytes) -> TransportResult<()>;

    /// Next message from the remote side. `None` once the remote closed.
    async fn recv(&mut self) -> Option<TransportResult<LinkMessage>>;

    /// Close gracefully.
    async fn close(&mut self) -> TransportResult<()>;
}
