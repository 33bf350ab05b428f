//! Synthetic camera producing a moving gradient.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use super::{CameraDriver, DeviceRequest, FrameGrabber};
use crate::error::CaptureError;
use crate::CaptureResult;

#[derive(Debug, Clone, Copy)]
enum Refusal {
    PermissionDenied,
    NoDevice,
}

/// Camera driver that needs no hardware.
///
/// Records every request it receives so callers can inspect what was asked
/// of the device.
#[derive(Debug, Clone)]
pub struct TestPatternDriver {
    frame_interval: Duration,
    actual_size: Option<(u32, u32)>,
    refusal: Option<Refusal>,
    fail_after: Option<u64>,
    requests: Arc<Mutex<Vec<DeviceRequest>>>,
}

impl Default for TestPatternDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl TestPatternDriver {
    /// Create a driver producing ~30 frames per second at the requested size.
    pub fn new() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            actual_size: None,
            refusal: None,
            fail_after: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A driver whose device always refuses access.
    pub fn denied() -> Self {
        Self {
            refusal: Some(Refusal::PermissionDenied),
            ..Self::new()
        }
    }

    /// A driver with no device attached.
    pub fn without_device() -> Self {
        Self {
            refusal: Some(Refusal::NoDevice),
            ..Self::new()
        }
    }

    /// Set the pause between frames.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Ignore the requested size and produce frames of this size instead.
    pub fn with_actual_size(mut self, width: u32, height: u32) -> Self {
        self.actual_size = Some((width, height));
        self
    }

    /// Report the device as lost after `frames` frames.
    pub fn with_failure_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<DeviceRequest> {
        self.requests.lock().clone()
    }
}

impl CameraDriver for TestPatternDriver {
    fn open(&self, request: &DeviceRequest) -> CaptureResult<Box<dyn FrameGrabber>> {
        self.requests.lock().push(*request);

        match self.refusal {
            Some(Refusal::PermissionDenied) => return Err(CaptureError::PermissionDenied),
            Some(Refusal::NoDevice) => return Err(CaptureError::NoDevice),
            None => {}
        }

        let (width, height) = self
            .actual_size
            .unwrap_or((request.ideal_width, request.ideal_height));

        debug!(width, height, "Opening test pattern device");

        Ok(Box::new(TestPatternGrabber {
            base: gradient(width, height),
            width,
            height,
            frame_interval: self.frame_interval,
            next_due: Instant::now(),
            frame_index: 0,
            fail_after: self.fail_after,
        }))
    }

    fn name(&self) -> &'static str {
        "test-pattern"
    }
}

struct TestPatternGrabber {
    base: Vec<u8>,
    width: u32,
    height: u32,
    frame_interval: Duration,
    next_due: Instant,
    frame_index: u64,
    fail_after: Option<u64>,
}

impl FrameGrabber for TestPatternGrabber {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn grab(&mut self) -> CaptureResult<Bytes> {
        if self.fail_after.is_some_and(|limit| self.frame_index >= limit) {
            return Err(CaptureError::DeviceLost);
        }

        let now = Instant::now();
        if self.next_due > now {
            thread::sleep(self.next_due - now);
        }
        self.next_due = Instant::now() + self.frame_interval;

        // Stamp the frame index into the first row so frames differ.
        let mut data = self.base.clone();
        let stamp = self.frame_index.to_le_bytes();
        for (pixel, value) in data.chunks_exact_mut(3).zip(stamp.iter()) {
            pixel.fill(*value);
        }
        self.frame_index += 1;

        Ok(Bytes::from(data))
    }

    fn close(&mut self) {
        debug!(frames = self.frame_index, "Closing test pattern device");
    }
}

fn gradient(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            data.push((x * 255 / width.max(1)) as u8);
            data.push((y * 255 / height.max(1)) as u8);
            data.push(128);
        }
    }
    data
}
