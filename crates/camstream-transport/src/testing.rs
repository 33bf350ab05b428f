//! In-memory connector for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use url::Url;

use crate::error::TransportError;
use crate::{Connector, Link, LinkMessage, TransportResult};

/// How a [`MockConnector`] answers connect attempts.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Accept,
    Refuse(String),
    /// Never completes.
    Hang,
    /// Accepts, but each write waits for [`MockConnector::release_writes`].
    Stall,
}

enum RemoteAction {
    Text(String),
    HangUp,
}

struct MockInner {
    behavior: MockBehavior,
    writes: Mutex<Vec<Bytes>>,
    connects: AtomicUsize,
    closed: AtomicBool,
    write_gate: Semaphore,
    remote: Mutex<Option<mpsc::UnboundedSender<RemoteAction>>>,
}

/// Connector whose links record every write.
#[derive(Clone)]
pub struct MockConnector {
    inner: Arc<MockInner>,
}

impl MockConnector {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            inner: Arc::new(MockInner {
                behavior,
                writes: Mutex::new(Vec::new()),
                connects: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                write_gate: Semaphore::new(0),
                remote: Mutex::new(None),
            }),
        }
    }

    pub fn accepting() -> Self {
        Self::new(MockBehavior::Accept)
    }

    pub fn refusing(reason: &str) -> Self {
        Self::new(MockBehavior::Refuse(reason.to_string()))
    }

    pub fn hanging() -> Self {
        Self::new(MockBehavior::Hang)
    }

    pub fn stalling() -> Self {
        Self::new(MockBehavior::Stall)
    }

    /// Let `count` stalled writes through.
    pub fn release_writes(&self, count: usize) {
        self.inner.write_gate.add_permits(count);
    }

    /// Payloads that reached the link, in order.
    pub fn writes(&self) -> Vec<Bytes> {
        self.inner.writes.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.inner.writes.lock().len()
    }

    pub fn connect_attempts(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Whether the link was closed from our side.
    pub fn was_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Deliver a text message from the remote side.
    pub fn push_text(&self, text: &str) -> bool {
        self.remote(RemoteAction::Text(text.to_string()))
    }

    /// Close the link from the remote side.
    pub fn hang_up(&self) -> bool {
        self.remote(RemoteAction::HangUp)
    }

    fn remote(&self, action: RemoteAction) -> bool {
        match self.inner.remote.lock().as_ref() {
            Some(tx) => tx.send(action).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _endpoint: &Url) -> TransportResult<Box<dyn Link>> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        match &self.inner.behavior {
            MockBehavior::Accept | MockBehavior::Stall => {
                let (tx, rx) = mpsc::unbounded_channel();
                *self.inner.remote.lock() = Some(tx);
                Ok(Box::new(MockLink {
                    inner: Arc::clone(&self.inner),
                    remote_rx: rx,
                }))
            }
            MockBehavior::Refuse(reason) => Err(TransportError::ConnectionFailed(reason.clone())),
            MockBehavior::Hang => std::future::pending().await,
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

struct MockLink {
    inner: Arc<MockInner>,
    remote_rx: mpsc::UnboundedReceiver<RemoteAction>,
}

#[async_trait]
impl Link for MockLink {
    async fn send(&mut self, payload: Bytes) -> TransportResult<()> {
        if matches!(self.inner.behavior, MockBehavior::Stall) {
            let permit = self
                .inner
                .write_gate
                .acquire()
                .await
                .map_err(|e| TransportError::Send(e.to_string()))?;
            permit.forget();
        }
        self.inner.writes.lock().push(payload);
        Ok(())
    }

    async fn recv(&mut self) -> Option<TransportResult<LinkMessage>> {
        match self.remote_rx.recv().await {
            Some(RemoteAction::Text(text)) => Some(Ok(LinkMessage::Text(text))),
            Some(RemoteAction::HangUp) | None => None,
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
