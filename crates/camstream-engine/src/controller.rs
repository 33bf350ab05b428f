//! Single owner of the camera, the stream and the settings.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use camstream_capture::{
    CameraDriver, CaptureError, CaptureSession, CaptureSource, FrameSample, LiveFeed,
};
use camstream_encoder::FrameCodec;
use camstream_ipc::{ChannelState, Resolution, Settings, StatsSnapshot};
use camstream_transport::{ChannelConfig, Connector};

use crate::error::StreamerError;
use crate::scheduler::{FrameScheduler, StreamStarted};
use crate::settings::SettingsStore;
use crate::StreamerResult;

/// Feed details of an active capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureInfo {
    pub requested: Resolution,
    pub width: u32,
    pub height: u32,
}

/// Coordinates capture and streaming.
///
/// At most one capture session and one stream exist at a time; a second
/// start of either is rejected rather than replacing the first.
pub struct StreamController {
    driver: Arc<dyn CameraDriver>,
    settings: SettingsStore,
    capture: Option<CaptureSession>,
    capture_info: Option<CaptureInfo>,
    scheduler: FrameScheduler,
}

impl StreamController {
    pub fn new(
        driver: Arc<dyn CameraDriver>,
        connector: Arc<dyn Connector>,
        channel_config: ChannelConfig,
        settings: SettingsStore,
        stats_tx: Arc<watch::Sender<StatsSnapshot>>,
    ) -> Self {
        Self {
            driver,
            settings,
            capture: None,
            capture_info: None,
            scheduler: FrameScheduler::new(connector, channel_config, stats_tx),
        }
    }

    /// Encode stream frames with `codec` instead of JPEG.
    pub fn with_codec(mut self, codec: Arc<dyn FrameCodec>) -> Self {
        self.scheduler = self.scheduler.with_codec(codec);
        self
    }

    /// Acquire the camera at the configured resolution.
    #[instrument(name = "controller_start_capture", skip(self))]
    pub async fn start_capture(&mut self) -> StreamerResult<CaptureInfo> {
        if self.capture.is_some() {
            return Err(StreamerError::Precondition("Camera is already active"));
        }

        let requested = self.settings.get().resolution;
        let driver = Arc::clone(&self.driver);

        // Opening a device blocks, so keep it off the engine thread.
        let session = tokio::task::spawn_blocking(move || {
            let mut session = CaptureSession::new(driver);
            session.start(requested).map(|()| session)
        })
        .await
        .map_err(|e| {
            warn!("Capture start task failed: {}", e);
            StreamerError::DeviceAccess(CaptureError::DeviceLost)
        })??;

        let (width, height) = session.dimensions();
        let info = CaptureInfo {
            requested,
            width,
            height,
        };

        self.capture = Some(session);
        self.capture_info = Some(info);
        Ok(info)
    }

    /// Release the camera, stopping the stream first if it is running.
    ///
    /// Returns false if no camera was active.
    #[instrument(name = "controller_stop_capture", skip(self))]
    pub async fn stop_capture(&mut self) -> bool {
        self.scheduler.stop().await;

        let Some(mut session) = self.capture.take() else {
            return false;
        };
        self.capture_info = None;

        let released = tokio::task::spawn_blocking(move || session.stop()).await;
        match released {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Capture stop failed: {}", e),
            Err(e) => warn!("Capture stop task failed: {}", e),
        }

        info!("Camera released");
        true
    }

    /// Start streaming with the current settings.
    pub fn start_stream(&mut self) -> StreamerResult<StreamStarted> {
        let feed = self.live_feed().ok_or(StreamerError::Precondition(
            "Start capture before starting the stream",
        ))?;

        self.scheduler.start(&feed, self.settings.get())
    }

    /// Stop streaming. Returns the channel's final state, or `None` if
    /// nothing was running.
    pub async fn stop_stream(&mut self) -> Option<ChannelState> {
        self.scheduler.stop().await
    }

    /// Replace the settings. Running capture and stream keep their values.
    pub fn update_settings(&mut self, settings: Settings) -> StreamerResult<()> {
        self.settings.replace(settings)?;
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        self.settings.get()
    }

    pub fn capture_info(&self) -> Option<CaptureInfo> {
        self.capture_info
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    pub fn is_streaming(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Operator preview frames of the active capture.
    pub fn preview(&self) -> Option<Receiver<FrameSample>> {
        self.capture.as_ref().and_then(|s| s.preview())
    }

    /// Whether a session exists whose device has gone away.
    pub fn capture_lost(&self) -> bool {
        self.capture.as_ref().is_some_and(|s| !s.is_active())
    }

    fn live_feed(&self) -> Option<LiveFeed> {
        self.capture
            .as_ref()
            .filter(|s| s.is_active())
            .map(|s| s.feed())
    }
}
