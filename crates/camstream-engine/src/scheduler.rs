//! Periodic frame scheduling.
//!
//! While running, a ticker task fires every `1000 / rate` ms. Each tick
//! samples the live feed, encodes on the blocking pool and offers the result
//! to the channel. A tick that fires while the previous one is still working
//! is skipped and counted as an overlap drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

use camstream_capture::LiveFeed;
use camstream_encoder::{FrameCodec, FrameEncoder, JpegCodec};
use camstream_ipc::{ChannelState, Settings, StatsSnapshot};
use camstream_transport::{
    ChannelConfig, ChannelSender, Connector, InboundMessage, SendOutcome, TransportChannel,
};

use crate::error::StreamerError;
use crate::stats::{DropCause, StatsAggregator};
use crate::{StreamerResult, TICK_SUMMARY_INTERVAL};

/// Handles for observing a stream that just started.
pub struct StreamStarted {
    /// Channel state changes, starting at `Connecting`.
    pub channel_states: watch::Receiver<ChannelState>,

    /// Notifications from the endpoint.
    pub inbound: Option<mpsc::Receiver<InboundMessage>>,
}

struct StreamSession {
    channel: TransportChannel,
    stats: Arc<StatsAggregator>,
    ticker: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

/// Owns the streaming activity: `Idle -> Running -> Idle`.
pub struct FrameScheduler {
    connector: Arc<dyn Connector>,
    channel_config: ChannelConfig,
    stats_tx: Arc<watch::Sender<StatsSnapshot>>,
    codec: Arc<dyn FrameCodec>,
    session: Option<StreamSession>,
}

impl FrameScheduler {
    pub fn new(
        connector: Arc<dyn Connector>,
        channel_config: ChannelConfig,
        stats_tx: Arc<watch::Sender<StatsSnapshot>>,
    ) -> Self {
        Self {
            connector,
            channel_config,
            stats_tx,
            codec: Arc::new(JpegCodec),
            session: None,
        }
    }

    /// Use `codec` instead of JPEG for frames of later streams.
    pub fn with_codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Open a channel to `settings.endpoint` and start ticking.
    ///
    /// Requires an active feed. The connect outcome arrives later through
    /// [`StreamStarted::channel_states`].
    #[instrument(name = "scheduler_start", skip_all, fields(rate = settings.rate, endpoint = %settings.endpoint))]
    pub fn start(&mut self, feed: &LiveFeed, settings: &Settings) -> StreamerResult<StreamStarted> {
        if self.session.is_some() {
            return Err(StreamerError::Precondition("Stream is already running"));
        }

        if !feed.is_active() {
            return Err(StreamerError::Precondition(
                "Start capture before starting the stream",
            ));
        }

        let mut channel = TransportChannel::new(
            Arc::clone(&self.connector),
            self.channel_config.clone(),
        );
        let sender = channel.connect(&settings.endpoint)?;

        let stats = Arc::new(StatsAggregator::begin(
            Arc::clone(&self.stats_tx),
            settings.rate,
        ));

        let channel_states = channel.subscribe();
        let monitor = tokio::spawn(watch_channel(channel.subscribe(), Arc::clone(&stats)));

        let ticker = Ticker {
            encoder: FrameEncoder::new(feed.clone(), Arc::clone(&self.codec)),
            sender,
            stats: Arc::clone(&stats),
            quality: settings.quality,
            in_flight: Arc::new(AtomicBool::new(false)),
        };
        let ticker = tokio::spawn(ticker.run(settings.tick_interval()));

        let inbound = channel.take_inbound();

        self.session = Some(StreamSession {
            channel,
            stats,
            ticker,
            monitor,
        });

        info!(interval = ?settings.tick_interval(), "Stream started");

        Ok(StreamStarted {
            channel_states,
            inbound,
        })
    }

    /// Stop ticking and close the channel.
    ///
    /// No tick fires after this returns. Returns the channel's final state,
    /// which stays `Failed` for a connect that never succeeded, or `None`
    /// if nothing was running.
    #[instrument(name = "scheduler_stop", skip(self))]
    pub async fn stop(&mut self) -> Option<ChannelState> {
        let mut session = self.session.take()?;

        session.ticker.abort();
        let _ = session.ticker.await;

        session.channel.close().await;

        session.monitor.abort();
        let _ = session.monitor.await;

        session.stats.finish();

        let transport = session.channel.statistics();
        info!(
            messages_sent = transport.messages_sent,
            bytes_sent = transport.bytes_sent,
            dropped = transport.messages_dropped,
            "Stream stopped"
        );
        Some(session.channel.state())
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// State of the current channel, if running.
    pub fn channel_state(&self) -> Option<ChannelState> {
        self.session.as_ref().map(|s| s.channel.state())
    }
}

/// Mirror channel connectivity into the stats.
async fn watch_channel(mut states: watch::Receiver<ChannelState>, stats: Arc<StatsAggregator>) {
    loop {
        let state = states.borrow_and_update().clone();
        stats.on_channel_state(&state);

        if state.is_terminal() || states.changed().await.is_err() {
            break;
        }
    }
}

/// Cleared when the tick holding it completes.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Ticker {
    encoder: FrameEncoder,
    sender: ChannelSender,
    stats: Arc<StatsAggregator>,
    quality: f32,
    in_flight: Arc<AtomicBool>,
}

impl Ticker {
    async fn run(self, period: Duration) {
        let start = Instant::now();
        let mut interval = tokio::time::interval_at(start + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut ticks: u64 = 0;
        let mut last_log = start;

        loop {
            interval.tick().await;
            ticks += 1;
            self.fire();

            if last_log.elapsed() >= TICK_SUMMARY_INTERVAL {
                let stats = self.stats.snapshot();
                info!(
                    ticks,
                    sent = stats.frames_sent,
                    dropped = stats.dropped_frames,
                    connected = stats.is_connected,
                    "Stream stats"
                );
                last_log = Instant::now();
            }
        }
    }

    fn fire(&self) {
        let Some(guard) = InFlight::try_acquire(&self.in_flight) else {
            debug!("Previous tick still running, skipping");
            self.stats.record_drop(DropCause::Overlap);
            return;
        };

        let Some(sample) = self.encoder.capture() else {
            trace!("No frame buffered");
            self.stats.record_drop(DropCause::Capture);
            return;
        };

        let encoder = self.encoder.clone();
        let sender = self.sender.clone();
        let stats = Arc::clone(&self.stats);
        let quality = self.quality;

        tokio::spawn(async move {
            let _guard = guard;
            let started = Instant::now();

            let encoded =
                tokio::task::spawn_blocking(move || encoder.encode(&sample, quality)).await;

            let frame = match encoded {
                Ok(Ok(frame)) => frame,
                Ok(Err(e)) => {
                    debug!("Encode failed: {}", e);
                    stats.record_drop(DropCause::Encode);
                    return;
                }
                Err(e) => {
                    warn!("Encode task failed: {}", e);
                    stats.record_drop(DropCause::Encode);
                    return;
                }
            };

            let len = frame.data.len();
            match sender.send(frame.data) {
                SendOutcome::HandedOff => stats.record_sent(len, started.elapsed()),
                SendOutcome::Dropped(reason) => {
                    trace!(?reason, "Frame dropped");
                    stats.record_drop(DropCause::Channel);
                }
            }
        });
    }
}
