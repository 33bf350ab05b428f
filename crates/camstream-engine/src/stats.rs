//! Delivery statistics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use camstream_ipc::{ChannelState, StatsSnapshot};

/// Why a tick produced no transmitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropCause {
    /// No feed data to sample.
    Capture,

    /// Encode yielded nothing.
    Encode,

    /// Channel not open, or its slot was busy.
    Channel,

    /// Previous tick still running.
    Overlap,
}

/// Publishes [`StatsSnapshot`]s for one stream session.
///
/// Every mutation republishes through the shared watch channel. Once
/// [`finish`](Self::finish) has run, further records are ignored so late
/// ticks cannot touch the next session's numbers.
pub struct StatsAggregator {
    publisher: Arc<watch::Sender<StatsSnapshot>>,
    active: AtomicBool,
}

impl StatsAggregator {
    /// Reset the published snapshot for a stream at `rate`.
    pub fn begin(publisher: Arc<watch::Sender<StatsSnapshot>>, rate: u32) -> Self {
        publisher.send_replace(StatsSnapshot {
            fps: rate,
            ..StatsSnapshot::default()
        });

        Self {
            publisher,
            active: AtomicBool::new(true),
        }
    }

    /// Track connectivity.
    pub fn on_channel_state(&self, state: &ChannelState) {
        let connected = state.is_open();
        self.update(|stats| {
            if stats.is_connected == connected {
                return false;
            }
            stats.is_connected = connected;
            true
        });
    }

    /// Record one frame handed to the channel.
    pub fn record_sent(&self, bytes: usize, latency: Duration) {
        self.update(|stats| {
            stats.frames_sent += 1;
            stats.bytes_sent += bytes as u64;
            stats.latency_ms = latency.as_secs_f64() * 1000.0;
            true
        });
    }

    /// Record a tick that sent nothing.
    pub fn record_drop(&self, cause: DropCause) {
        self.update(|stats| {
            stats.dropped_frames += 1;
            match cause {
                DropCause::Capture => stats.capture_drops += 1,
                DropCause::Encode => stats.encode_drops += 1,
                DropCause::Channel => stats.channel_drops += 1,
                DropCause::Overlap => stats.overlap_drops += 1,
            }
            true
        });
    }

    /// End the session. Idempotent.
    pub fn finish(&self) {
        self.publisher.send_if_modified(|stats| {
            if !self.active.swap(false, Ordering::SeqCst) {
                return false;
            }
            debug!(
                frames_sent = stats.frames_sent,
                dropped = stats.dropped_frames,
                "Stream stats final"
            );
            stats.frames_sent = 0;
            stats.is_connected = false;
            true
        });
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Current published values.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.publisher.borrow().clone()
    }

    fn update(&self, mutate: impl FnOnce(&mut StatsSnapshot) -> bool) {
        // The check runs under the watch lock so it cannot race `finish`.
        self.publisher.send_if_modified(|stats| {
            if !self.active.load(Ordering::SeqCst) {
                return false;
            }
            mutate(stats)
        });
    }
}
