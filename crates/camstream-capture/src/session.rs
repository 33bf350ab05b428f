//! Capture session management.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, instrument, trace, warn};

use camstream_ipc::Resolution;

use crate::device::{CameraDriver, DeviceRequest};
use crate::error::CaptureError;
use crate::feed::LiveFeed;
use crate::frame::{CaptureTimestamp, FrameSample};
use crate::{CaptureResult, CaptureSource, DEVICE_OPEN_TIMEOUT, PREVIEW_CHANNEL_CAPACITY};

/// A live binding to one camera.
pub struct CaptureSession {
    driver: Arc<dyn CameraDriver>,
    feed: LiveFeed,
    running: Arc<AtomicBool>,
    pump_thread: Option<JoinHandle<()>>,
    preview_rx: Option<Receiver<FrameSample>>,
    requested: Option<Resolution>,
    width: u32,
    height: u32,
}

impl CaptureSession {
    /// Create an inactive session on top of `driver`.
    pub fn new(driver: Arc<dyn CameraDriver>) -> Self {
        Self {
            driver,
            feed: LiveFeed::new(),
            running: Arc::new(AtomicBool::new(false)),
            pump_thread: None,
            preview_rx: None,
            requested: None,
            width: 0,
            height: 0,
        }
    }

    /// Resolution asked for by the last successful start.
    pub fn requested_resolution(&self) -> Option<Resolution> {
        self.requested
    }

    /// Frames mirrored for the operator's live view.
    ///
    /// Frames are offered without blocking; a slow viewer misses frames.
    pub fn preview(&self) -> Option<Receiver<FrameSample>> {
        self.preview_rx.clone()
    }
}

impl CaptureSource for CaptureSession {
    #[instrument(name = "capture_start", skip(self), fields(driver = self.driver.name()))]
    fn start(&mut self, resolution: Resolution) -> CaptureResult<()> {
        if self.is_active() || self.pump_thread.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }

        info!(%resolution, "Starting capture");

        let request = DeviceRequest::from(resolution);
        let (open_tx, open_rx) = crossbeam_channel::bounded(1);
        let (preview_tx, preview_rx) = crossbeam_channel::bounded(PREVIEW_CHANNEL_CAPACITY);

        // Fresh feed per session so a detached pump can never touch it.
        self.feed = LiveFeed::new();
        self.running = Arc::new(AtomicBool::new(true));

        let pump = Pump {
            driver: Arc::clone(&self.driver),
            request,
            feed: self.feed.clone(),
            running: Arc::clone(&self.running),
            preview_tx,
        };

        let handle = thread::Builder::new()
            .name("camstream-capture".to_string())
            .spawn(move || pump.run(open_tx))?;

        match open_rx.recv_timeout(DEVICE_OPEN_TIMEOUT) {
            Ok(Ok((width, height))) => {
                self.width = width;
                self.height = height;
                self.requested = Some(resolution);
                self.preview_rx = Some(preview_rx);
                self.pump_thread = Some(handle);
                info!(width, height, "Capture started");
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                warn!("Capture device refused: {}", e);
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                // The pump may be stuck inside the driver; leave it detached.
                self.running.store(false, Ordering::SeqCst);
                warn!("Capture device did not open in time");
                Err(CaptureError::OpenTimeout(DEVICE_OPEN_TIMEOUT))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(CaptureError::DeviceLost)
            }
        }
    }

    #[instrument(name = "capture_stop", skip(self))]
    fn stop(&mut self) -> CaptureResult<()> {
        let Some(handle) = self.pump_thread.take() else {
            return Ok(());
        };

        info!("Stopping capture");

        self.running.store(false, Ordering::SeqCst);
        self.feed.unbind();
        self.preview_rx = None;

        if handle.join().is_err() {
            warn!("Capture pump panicked");
        }

        info!("Capture stopped");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.pump_thread.is_some() && self.feed.is_active()
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn feed(&self) -> LiveFeed {
        self.feed.clone()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Everything the pump thread owns.
struct Pump {
    driver: Arc<dyn CameraDriver>,
    request: DeviceRequest,
    feed: LiveFeed,
    running: Arc<AtomicBool>,
    preview_tx: Sender<FrameSample>,
}

impl Pump {
    fn run(self, open_tx: Sender<CaptureResult<(u32, u32)>>) {
        let mut grabber = match self.driver.open(&self.request) {
            Ok(grabber) => grabber,
            Err(e) => {
                let _ = open_tx.send(Err(e));
                return;
            }
        };

        let (width, height) = grabber.dimensions();
        self.feed.bind();

        if open_tx.send(Ok((width, height))).is_err() {
            // Caller timed out and went away.
            self.feed.unbind();
            grabber.close();
            return;
        }

        let origin = Instant::now();
        let mut sequence: u64 = 0;

        while self.running.load(Ordering::SeqCst) {
            match grabber.grab() {
                Ok(data) => {
                    let (width, height) = grabber.dimensions();
                    let frame = FrameSample::new(
                        data,
                        width,
                        height,
                        CaptureTimestamp::now(origin),
                        sequence,
                    );

                    if sequence < 3 || sequence % 300 == 0 {
                        trace!(sequence, width, height, "Frame captured");
                    }
                    sequence += 1;

                    let _ = self.preview_tx.try_send(frame.clone());
                    self.feed.publish(frame);
                }
                Err(e) => {
                    warn!("Capture device error: {}", e);
                    break;
                }
            }
        }

        self.feed.unbind();
        grabber.close();
        debug!(frames = sequence, "Capture pump stopped");
    }
}
