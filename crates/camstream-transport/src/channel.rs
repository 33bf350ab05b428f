//! Channel lifecycle and the connection task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use camstream_ipc::ChannelState;

use crate::connection::{transition, ChannelConfig, ChannelEvent};
use crate::error::TransportError;
use crate::{
    Connector, Link, LinkMessage, TransportResult, CLOSE_TIMEOUT, INBOUND_CHANNEL_CAPACITY,
    OUTBOUND_SLOT_CAPACITY,
};

/// Why a payload was not handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Channel was not open.
    NotOpen,

    /// The previous payload is still waiting for the link.
    SlotBusy,
}

/// Result of [`ChannelSender::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    HandedOff,
    Dropped(DropReason),
}

impl SendOutcome {
    /// Check if the payload reached the outbound slot.
    pub fn is_handed_off(&self) -> bool {
        matches!(self, Self::HandedOff)
    }
}

/// A text notification received from the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub text: String,
}

impl InboundMessage {
    /// The `type` field when the message is a JSON object.
    pub fn kind(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.text).ok()?;
        value.get("type")?.as_str().map(str::to_string)
    }
}

/// Transport statistics.
#[derive(Debug, Clone, Default)]
pub struct TransportStatistics {
    pub bytes_sent: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
}

/// State shared between the channel, its senders and the connection task.
struct ChannelShared {
    state: watch::Sender<ChannelState>,
    bytes_sent: AtomicU64,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl ChannelShared {
    fn new() -> Self {
        let (state, _) = watch::channel(ChannelState::Idle);
        Self {
            state,
            bytes_sent: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    fn state(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    fn is_open(&self) -> bool {
        self.state.borrow().is_open()
    }

    /// Run `event` through the state machine and publish the result.
    fn apply(&self, event: ChannelEvent) -> TransportResult<ChannelState> {
        let mut outcome = Ok(ChannelState::Idle);

        self.state.send_if_modified(|state| match transition(state, &event) {
            Ok(next) => {
                let changed = *state != next;
                if changed {
                    debug!(from = state.name(), to = next.name(), "Channel transition");
                }
                *state = next.clone();
                outcome = Ok(next);
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });

        outcome
    }

    fn record_drop(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Cloneable send handle for one channel.
#[derive(Clone)]
pub struct ChannelSender {
    shared: Arc<ChannelShared>,
    outbound: mpsc::Sender<Bytes>,
}

impl ChannelSender {
    /// Offer one payload without blocking.
    ///
    /// Payloads offered while the channel is not open are discarded.
    pub fn send(&self, payload: Bytes) -> SendOutcome {
        if !self.shared.is_open() {
            self.shared.record_drop();
            trace!("Dropped payload, channel not open");
            return SendOutcome::Dropped(DropReason::NotOpen);
        }

        match self.outbound.try_send(payload) {
            Ok(()) => SendOutcome::HandedOff,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.shared.record_drop();
                trace!("Dropped payload, link busy");
                SendOutcome::Dropped(DropReason::SlotBusy)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.shared.record_drop();
                SendOutcome::Dropped(DropReason::NotOpen)
            }
        }
    }

    /// Current channel state.
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }
}

/// One outbound connection.
///
/// A channel connects at most once. Start a new channel to reconnect.
pub struct TransportChannel {
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    shared: Arc<ChannelShared>,
    inbound_rx: Option<mpsc::Receiver<InboundMessage>>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TransportChannel {
    /// Create an idle channel.
    pub fn new(connector: Arc<dyn Connector>, config: ChannelConfig) -> Self {
        Self {
            connector,
            config,
            shared: Arc::new(ChannelShared::new()),
            inbound_rx: None,
            shutdown: CancellationToken::new(),
            task: None,
        }
    }

    /// Start connecting to `endpoint`.
    ///
    /// Returns as soon as the channel is `Connecting`; the outcome arrives
    /// as a state change. Must be called from within a tokio runtime.
    #[instrument(name = "channel_connect", skip(self), fields(connector = self.connector.name()))]
    pub fn connect(&mut self, endpoint: &str) -> TransportResult<ChannelSender> {
        let url = parse_endpoint(endpoint)?;
        self.shared.apply(ChannelEvent::Connect)?;

        info!(endpoint = %url, timeout = ?self.config.connect_timeout, "Connecting");

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_SLOT_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        let sender = ChannelSender {
            shared: Arc::clone(&self.shared),
            outbound: outbound_tx,
        };

        let task = ConnectionTask {
            connector: Arc::clone(&self.connector),
            endpoint: url,
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            outbound_rx,
            inbound_tx,
            shutdown: self.shutdown.clone(),
        };

        self.task = Some(tokio::spawn(task.run()));
        self.inbound_rx = Some(inbound_rx);

        Ok(sender)
    }

    /// Close the channel and release the connection.
    ///
    /// Legal from any state; calling it again does nothing.
    #[instrument(name = "channel_close", skip(self))]
    pub async fn close(&mut self) {
        let _ = self.shared.apply(ChannelEvent::Closed);
        self.shutdown.cancel();

        let Some(mut task) = self.task.take() else {
            return;
        };

        if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
            warn!("Connection task did not stop in time, aborting");
            task.abort();
        }

        info!("Channel closed");
    }

    /// Wait until the connect attempt settles.
    ///
    /// Errors if the channel failed, closed, or was never connected.
    pub async fn wait_open(&self) -> TransportResult<()> {
        let mut rx = self.shared.state.subscribe();
        let settled = rx
            .wait_for(|state| !state.is_connecting())
            .await
            .map_err(|_| TransportError::ClosedBeforeOpen)?
            .clone();

        match settled {
            ChannelState::Open => Ok(()),
            ChannelState::Failed { reason } => Err(TransportError::ConnectionFailed(reason)),
            _ => Err(TransportError::ClosedBeforeOpen),
        }
    }

    /// Current channel state.
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Take the receiver for endpoint notifications.
    pub fn take_inbound(&mut self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.inbound_rx.take()
    }

    /// Get transport statistics.
    pub fn statistics(&self) -> TransportStatistics {
        TransportStatistics {
            bytes_sent: self.shared.bytes_sent.load(Ordering::Relaxed),
            messages_sent: self.shared.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.shared.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        let _ = self.shared.apply(ChannelEvent::Closed);
        self.shutdown.cancel();
    }
}

fn parse_endpoint(endpoint: &str) -> TransportResult<Url> {
    let url = Url::parse(endpoint.trim()).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme '{}', expected ws:// or wss://",
                other
            )))
        }
    }

    if url.host_str().is_none() {
        return Err(TransportError::InvalidUrl("Missing host".to_string()));
    }

    Ok(url)
}

struct ConnectionTask {
    connector: Arc<dyn Connector>,
    endpoint: Url,
    config: ChannelConfig,
    shared: Arc<ChannelShared>,
    outbound_rx: mpsc::Receiver<Bytes>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    shutdown: CancellationToken,
}

impl ConnectionTask {
    async fn run(mut self) {
        let attempt = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                debug!("Connect abandoned");
                return;
            }
            result = self.establish() => result,
        };

        let mut link = match attempt {
            Ok(link) => link,
            Err(e) => {
                warn!(endpoint = %self.endpoint, "Connection failed: {}", e);
                let _ = self.shared.apply(ChannelEvent::Failed(e.to_string()));
                return;
            }
        };

        if self.shared.apply(ChannelEvent::Opened).is_err() {
            // Closed while the handshake was finishing.
            let _ = link.close().await;
            return;
        }

        info!(endpoint = %self.endpoint, "Channel open");

        // With every sender gone the link stays up for inbound traffic
        // until the channel closes.
        let mut senders_alive = true;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    if let Err(e) = link.close().await {
                        debug!("Close handshake failed: {}", e);
                    }
                    break;
                }
                payload = self.outbound_rx.recv(), if senders_alive => {
                    let Some(payload) = payload else {
                        senders_alive = false;
                        continue;
                    };
                    if !self.deliver(link.as_mut(), payload).await {
                        break;
                    }
                }
                message = link.recv() => {
                    if !self.receive(message) {
                        break;
                    }
                }
            }
        }

        debug!("Connection task stopped");
    }

    async fn establish(&self) -> TransportResult<Box<dyn Link>> {
        match self.config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, self.connector.connect(&self.endpoint))
                .await
                .map_err(|_| TransportError::ConnectTimeout(limit))?,
            None => self.connector.connect(&self.endpoint).await,
        }
    }

    /// Write one payload. Returns false when the link is gone.
    async fn deliver(&self, link: &mut dyn Link, payload: Bytes) -> bool {
        let len = payload.len() as u64;

        match link.send(payload).await {
            Ok(()) => {
                self.shared.bytes_sent.fetch_add(len, Ordering::Relaxed);
                self.shared.messages_sent.fetch_add(1, Ordering::Relaxed);
                let _ = self.shared.apply(ChannelEvent::MessageSent);
                true
            }
            Err(e) => {
                warn!("Send error: {}", e);
                self.shared.record_drop();
                let _ = self.shared.apply(ChannelEvent::Closed);
                false
            }
        }
    }

    /// Handle one remote message. Returns false when the link is gone.
    fn receive(&self, message: Option<TransportResult<LinkMessage>>) -> bool {
        match message {
            Some(Ok(LinkMessage::Text(text))) => {
                debug!(len = text.len(), "Received notification");
                if self.inbound_tx.try_send(InboundMessage { text }).is_err() {
                    trace!("Inbound notification dropped");
                }
                true
            }
            Some(Ok(LinkMessage::Binary(data))) => {
                trace!(len = data.len(), "Ignoring binary message");
                true
            }
            Some(Err(e)) => {
                warn!("Link error: {}", e);
                let _ = self.shared.apply(ChannelEvent::Closed);
                false
            }
            None => {
                info!("Remote closed the connection");
                let _ = self.shared.apply(ChannelEvent::Closed);
                false
            }
        }
    }
}
