//! Newest-frame slot shared between the capture pump and encoders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::frame::FrameSample;

#[derive(Default)]
struct FeedInner {
    latest: Mutex<Option<FrameSample>>,
    ready: Condvar,
    active: AtomicBool,
}

/// Live visual feed of an active capture session.
///
/// Holds only the newest frame. Cloning yields another handle to the same
/// feed.
#[derive(Clone, Default)]
pub struct LiveFeed {
    inner: Arc<FeedInner>,
}

impl LiveFeed {
    /// Create an unbound feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the feed as bound to a device.
    pub fn bind(&self) {
        let _slot = self.inner.latest.lock();
        self.inner.active.store(true, Ordering::SeqCst);
    }

    /// Detach the feed from its device and drop any buffered frame.
    pub fn unbind(&self) {
        let mut slot = self.inner.latest.lock();
        self.inner.active.store(false, Ordering::SeqCst);
        *slot = None;
        self.inner.ready.notify_all();
    }

    /// Check if a device is bound.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Replace the buffered frame. Ignored while unbound.
    pub fn publish(&self, frame: FrameSample) {
        let mut slot = self.inner.latest.lock();
        if !self.inner.active.load(Ordering::SeqCst) {
            return;
        }
        *slot = Some(frame);
        self.inner.ready.notify_all();
    }

    /// Newest buffered frame, if the feed is bound and has data.
    pub fn latest(&self) -> Option<FrameSample> {
        let slot = self.inner.latest.lock();
        if !self.inner.active.load(Ordering::SeqCst) {
            return None;
        }
        slot.clone()
    }

    /// Block until a frame is buffered, the feed unbinds, or `timeout`
    /// passes. Returns true if a frame is available.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.inner.latest.lock();

        while slot.is_none() && self.inner.active.load(Ordering::SeqCst) {
            if self.inner.ready.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }

        slot.is_some() && self.inner.active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for LiveFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveFeed")
            .field("active", &self.is_active())
            .finish()
    }
}
